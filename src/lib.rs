#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

pub mod dt1 {
	pub mod pixels;

	use {
		self::pixels::{DecodeError, Pixels, ISOMETRIC_FORMAT},
		byteorder::{ReadBytesExt, LE},
		core::fmt,
		log::{debug, trace},
		serde::Serialize,
		std::{
			fs::File,
			io::{self, BufReader, Read, Seek, SeekFrom},
			path::Path,
		},
		thiserror::Error,
	};

	/// Where the tile count and the tile headers pointer live. Everything between the
	/// two leading version words and this position is unused.
	const TILE_COUNT_POSITION: u64 = 268;

	const TILE_HEADER_LEN: i64 = 96;
	const BLOCK_HEADER_LEN: i64 = 20;

	// Reserved widths inside a tile header.
	const TILE_RESERVED_AFTER_WIDTH: usize = 4; // always zeros
	const TILE_RESERVED_AFTER_RARITY: usize = 4; // unknown, usually zeros
	const TILE_RESERVED_AFTER_SUBTILE_FLAGS: usize = 7; // always zeros
	const TILE_RESERVED_TAIL: usize = 12; // 4 zeros, 4 "almost always zeros", 4 zeros

	// Reserved widths inside a block header.
	const BLOCK_RESERVED_AFTER_Y: usize = 2; // always zeros
	const BLOCK_RESERVED_AFTER_LENGTH: usize = 2; // always zeros

	const SUBTILE_SIZE: usize = 5;
	pub const NUM_SUBTILES: usize = SUBTILE_SIZE.pow(2);

	pub const FLOOR: i32 = 0;
	pub const ROOF: i32 = 15;

	/// The record being read when decoding stopped.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub enum Record {
		FileHeader,
		TileHeader(usize),
		BlockHeader { tile: usize, block: usize },
		BlockData { tile: usize, block: usize },
	}

	impl fmt::Display for Record {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			match *self {
				Self::FileHeader => write!(f, "file header"),
				Self::TileHeader(tile) => write!(f, "header of tile {tile}"),
				Self::BlockHeader { tile, block } => write!(f, "header of block {block} of tile {tile}"),
				Self::BlockData { tile, block } => write!(f, "data of block {block} of tile {tile}"),
			}
		}
	}

	#[derive(Debug, Error)]
	pub enum Error {
		#[error("cannot open DT1: {0}")]
		Open(#[source] io::Error),

		#[error("DT1 is truncated in the {record}: {source}")]
		Truncated {
			record: Record,
			#[source]
			source: io::Error,
		},

		#[error("the {record} has a negative {what}: {value}")]
		Negative { record: Record, what: &'static str, value: i64 },

		#[error("tile {tile}, block {block}: {source}")]
		Block {
			tile: usize,
			block: usize,
			#[source]
			source: DecodeError,
		},
	}

	impl Error {
		/// The I/O failures of the loader are all reads past the end of the source.
		fn truncated(record: Record) -> impl FnOnce(io::Error) -> Self {
			move |source| Self::Truncated { record, source }
		}
	}

	/// A decoded DT1: the whole tile catalog, read once and never modified afterwards.
	#[derive(Debug, Clone, Serialize)]
	pub struct TileSet {
		x1: i32,
		x2: i32,
		tileHeadersPointer: i32,

		#[serde(rename = "tile")]
		tiles: Vec<Tile>,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
	pub struct TileHeader {
		pub direction: i32,
		pub roofHeight: i16,
		pub soundIndex: u8,
		pub isAnimated: bool,
		pub height: i32,
		pub width: i32,
		pub orientation: i32,
		pub mainIndex: i32,
		pub subIndex: i32,
		pub rarityOrFrameIndex: i32,
		pub subtileFlags: [u8; NUM_SUBTILES],
		pub blockHeadersPointer: i32,
		/// Block headers plus block data of this tile.
		pub blockDataLength: i32,
		pub numBlocks: i32,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
	pub struct Tile {
		#[serde(flatten)]
		pub header: TileHeader,

		#[serde(rename = "block")]
		pub blocks: Vec<Block>,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
	pub struct BlockHeader {
		pub x: i16,
		pub y: i16,
		pub gridX: u8,
		pub gridY: u8,
		pub format: i16,
		pub length: i32,
		/// Relative to the owning tile's `blockHeadersPointer`.
		pub fileOffset: i32,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
	pub struct Block {
		#[serde(flatten)]
		pub header: BlockHeader,
		pub pixels: Pixels,
	}

	impl TileSet {
		/// Each stage seeks to offsets read by the previous one, so all tile headers are read
		/// before any block header, and all block headers before any block data.
		pub fn read<R: Read + Seek + ?Sized>(source: &mut R) -> Result<Self, Error> {
			let record = Record::FileHeader;
			let (x1, x2, numTiles, tileHeadersPointer) = (|| -> io::Result<_> {
				let x1 = source.read_i32::<LE>()?;
				let x2 = source.read_i32::<LE>()?;
				source.seek(SeekFrom::Start(TILE_COUNT_POSITION))?;
				Ok((x1, x2, source.read_i32::<LE>()?, source.read_i32::<LE>()?))
			})()
			.map_err(Error::truncated(record))?;
			debug!("x1 = {x1}, x2 = {x2}, numTiles = {numTiles}, tileHeadersPointer = {tileHeadersPointer}");
			let numTiles = count(numTiles, record, "tile count")?;

			let mut tileHeaders = Vec::new();
			for i in 0..numTiles {
				let record = Record::TileHeader(i);
				seekTo(source, i64::from(tileHeadersPointer) + i as i64 * TILE_HEADER_LEN, record)?;
				let header = TileHeader::read(source).map_err(Error::truncated(record))?;
				debug!(
					"tile {i}: orientation = {}, mainIndex = {}, subIndex = {}, numBlocks = {}",
					header.orientation, header.mainIndex, header.subIndex, header.numBlocks
				);
				tileHeaders.push(header);
			}

			let mut blockHeaders = Vec::with_capacity(tileHeaders.len());
			for (i, tile) in tileHeaders.iter().enumerate() {
				let numBlocks = count(tile.numBlocks, Record::TileHeader(i), "block count")?;
				let mut headers = Vec::new();
				for j in 0..numBlocks {
					let record = Record::BlockHeader { tile: i, block: j };
					seekTo(source, i64::from(tile.blockHeadersPointer) + j as i64 * BLOCK_HEADER_LEN, record)?;
					headers.push(BlockHeader::read(source).map_err(Error::truncated(record))?);
				}
				blockHeaders.push(headers);
			}

			let mut tiles = Vec::with_capacity(tileHeaders.len());
			for (i, (header, blockHeaders)) in tileHeaders.into_iter().zip(blockHeaders).enumerate() {
				let mut blocks = Vec::with_capacity(blockHeaders.len());
				for (j, blockHeader) in blockHeaders.into_iter().enumerate() {
					let record = Record::BlockData { tile: i, block: j };
					seekTo(
						source,
						i64::from(header.blockHeadersPointer) + i64::from(blockHeader.fileOffset),
						record,
					)?;
					trace!(
						"tile {i}, block {j}: format = {}, length = {}, at ({}, {})",
						blockHeader.format,
						blockHeader.length,
						blockHeader.x,
						blockHeader.y
					);
					let pixels =
						Pixels::decode(blockHeader.format, blockHeader.length, source).map_err(|err| match err {
							DecodeError::Io(source) => Error::Truncated { record, source },
							source => Error::Block { tile: i, block: j, source },
						})?;
					blocks.push(Block { header: blockHeader, pixels });
				}
				tiles.push(Tile { header, blocks });
			}

			Ok(Self { x1, x2, tileHeadersPointer, tiles })
		}

		pub fn fromBytes(dt1: &[u8]) -> Result<Self, Error> {
			Self::read(&mut io::Cursor::new(dt1))
		}

		pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
			Self::read(&mut BufReader::new(File::open(path).map_err(Error::Open)?))
		}

		pub fn x1(&self) -> i32 {
			self.x1
		}

		pub fn x2(&self) -> i32 {
			self.x2
		}

		pub fn tileHeadersPointer(&self) -> i32 {
			self.tileHeadersPointer
		}

		pub fn numTiles(&self) -> usize {
			self.tiles.len()
		}

		pub fn tiles(&self) -> &[Tile] {
			&self.tiles
		}

		pub fn tile(&self, index: usize) -> Option<&Tile> {
			self.tiles.get(index)
		}

		/// Tiles placeable under the given map key, with their indices.
		pub fn find(
			&self,
			orientation: i32,
			mainIndex: i32,
			subIndex: i32,
		) -> impl Iterator<Item = (usize, &Tile)> + '_ {
			self.tiles.iter().enumerate().filter(move |(_, tile)| {
				let header = &tile.header;
				(header.orientation, header.mainIndex, header.subIndex) == (orientation, mainIndex, subIndex)
			})
		}
	}

	impl TileHeader {
		fn read<R: Read + ?Sized>(source: &mut R) -> io::Result<Self> {
			let direction = source.read_i32::<LE>()?;
			let roofHeight = source.read_i16::<LE>()?;
			let soundIndex = source.read_u8()?;
			let isAnimated = source.read_u8()? == 1;
			let height = source.read_i32::<LE>()?;
			let width = source.read_i32::<LE>()?;
			source.skipReserved::<TILE_RESERVED_AFTER_WIDTH>()?;
			let orientation = source.read_i32::<LE>()?;
			let mainIndex = source.read_i32::<LE>()?;
			let subIndex = source.read_i32::<LE>()?;
			let rarityOrFrameIndex = source.read_i32::<LE>()?;
			source.skipReserved::<TILE_RESERVED_AFTER_RARITY>()?;
			let subtileFlags = source.read_u8_array()?;
			source.skipReserved::<TILE_RESERVED_AFTER_SUBTILE_FLAGS>()?;
			let blockHeadersPointer = source.read_i32::<LE>()?;
			let blockDataLength = source.read_i32::<LE>()?;
			let numBlocks = source.read_i32::<LE>()?;
			source.skipReserved::<TILE_RESERVED_TAIL>()?;
			Ok(Self {
				direction,
				roofHeight,
				soundIndex,
				isAnimated,
				height,
				width,
				orientation,
				mainIndex,
				subIndex,
				rarityOrFrameIndex,
				subtileFlags,
				blockHeadersPointer,
				blockDataLength,
				numBlocks,
			})
		}
	}

	impl Tile {
		pub fn numBlocks(&self) -> usize {
			self.blocks.len()
		}

		pub fn isFloor(&self) -> bool {
			self.header.orientation == FLOOR
		}

		pub fn isRoof(&self) -> bool {
			self.header.orientation == ROOF
		}

		/// Flags of the subtile at column `x`, row `y` of the 5x5 grid.
		pub fn subtileFlag(&self, x: usize, y: usize) -> Option<u8> {
			if x >= SUBTILE_SIZE || y >= SUBTILE_SIZE {
				return None;
			}
			Some(self.header.subtileFlags[x + y * SUBTILE_SIZE])
		}
	}

	impl BlockHeader {
		fn read<R: Read + ?Sized>(source: &mut R) -> io::Result<Self> {
			let x = source.read_i16::<LE>()?;
			let y = source.read_i16::<LE>()?;
			source.skipReserved::<BLOCK_RESERVED_AFTER_Y>()?;
			let gridX = source.read_u8()?;
			let gridY = source.read_u8()?;
			let format = source.read_i16::<LE>()?;
			let length = source.read_i32::<LE>()?;
			source.skipReserved::<BLOCK_RESERVED_AFTER_LENGTH>()?;
			let fileOffset = source.read_i32::<LE>()?;
			Ok(Self { x, y, gridX, gridY, format, length, fileOffset })
		}
	}

	impl Block {
		pub fn isIsometric(&self) -> bool {
			self.header.format == ISOMETRIC_FORMAT
		}
	}

	fn count(value: i32, record: Record, what: &'static str) -> Result<usize, Error> {
		usize::try_from(value).map_err(|_| Error::Negative { record, what, value: value.into() })
	}

	fn seekTo<R: Seek + ?Sized>(source: &mut R, offset: i64, record: Record) -> Result<(), Error> {
		let position =
			u64::try_from(offset).map_err(|_| Error::Negative { record, what: "offset", value: offset })?;
		source.seek(SeekFrom::Start(position)).map_err(Error::truncated(record))?;
		Ok(())
	}

	trait ReadExt: Read {
		/// Consumes reserved bytes without interpreting them.
		fn skipReserved<const N: usize>(&mut self) -> io::Result<()> {
			self.read_u8_array::<N>().map(drop)
		}

		fn read_u8_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
			let mut array = [0; N];
			self.read_exact(&mut array)?;
			Ok(array)
		}
	}
	impl<R: Read + ?Sized> ReadExt for R {}

}

use std::fs::File;

#[cfg(unix)]
pub fn stdoutRaw() -> File {
	use std::os::unix::io::FromRawFd;
	unsafe { File::from_raw_fd(1) }
}

#[cfg(windows)]
pub fn stdoutRaw() -> File {
	use std::{
		io,
		os::windows::io::{AsRawHandle, FromRawHandle},
	};
	unsafe { File::from_raw_handle(io::stdout().as_raw_handle()) }
}
