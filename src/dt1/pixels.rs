use {
	byteorder::ReadBytesExt,
	core::fmt,
	serde::{Serialize, Serializer},
	std::io::{self, Read},
	thiserror::Error,
};

pub const BLOCK_WIDTH_LOG2: usize = 5;
pub const BLOCK_WIDTH: usize = 1 << BLOCK_WIDTH_LOG2;
pub const BLOCK_HEIGHT: usize = 32;
pub const NUM_PIXELS: usize = BLOCK_WIDTH * BLOCK_HEIGHT;

pub const ISOMETRIC_FORMAT: i16 = 1;

// 3d-isometric subtile is 256 bytes, no more, no less
pub const ISOMETRIC_LENGTH: i32 = 256;

// Per row of a 3d-isometric block: the first column written, and how many pixels follow.
const XJUMP: [u8; 15] = [14, 12, 10, 8, 6, 4, 2, 0, 2, 4, 6, 8, 10, 12, 14];
const NBPIX: [u8; 15] = [4, 8, 12, 16, 20, 24, 28, 32, 28, 24, 20, 16, 12, 8, 4];

#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("expected exactly {expected} bytes of isometric block data, but got {actual} instead")]
	IsometricLength { expected: i32, actual: i32 },

	#[error("block data needs {needed} more bytes, but only {remaining} are left")]
	LengthUnderflow { remaining: i32, needed: i32 },

	#[error("pixel index {index} is past the end of the {NUM_PIXELS}-pixel block")]
	OutOfBlock { index: usize },

	#[error(transparent)]
	Io(#[from] io::Error),
}

/// Palette indices of one 32x32 block, row-major. Zero stands both for "no pixel" and for
/// palette index 0.
#[derive(Clone, PartialEq, Eq)]
pub struct Pixels(Box<[u8; NUM_PIXELS]>);

impl Pixels {
	pub fn decode<R: Read + ?Sized>(format: i16, length: i32, data: &mut R) -> Result<Self, DecodeError> {
		let mut pixels = Self(Box::new([0; NUM_PIXELS]));
		if format == ISOMETRIC_FORMAT {
			pixels.drawBlockIsometric(0, 0, length, data)?;
		} else {
			pixels.drawBlockNormal(0, 0, length, data)?;
		}
		Ok(pixels)
	}

	pub fn get(&self, x: usize, y: usize) -> Option<u8> {
		if x >= BLOCK_WIDTH || y >= BLOCK_HEIGHT {
			return None;
		}
		Some(self.0[x + (y << BLOCK_WIDTH_LOG2)])
	}

	pub fn asArray(&self) -> &[u8; NUM_PIXELS] {
		&self.0
	}

	pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
		self.0.chunks_exact(BLOCK_WIDTH)
	}
}

impl fmt::Debug for Pixels {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let written = self.0.iter().filter(|&&pixel| pixel != 0).count();
		write!(f, "Pixels({written}/{NUM_PIXELS} non-zero)")
	}
}

impl Serialize for Pixels {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_seq(self.rows())
	}
}

impl DrawDestination for Pixels {
	#[inline(always)]
	fn widthLog2(&self) -> usize {
		BLOCK_WIDTH_LOG2
	}
	#[inline(always)]
	fn putpixel(&mut self, atIndex: usize, withValue: u8) {
		self.0[atIndex] = withValue;
	}
}

/// Anything blocks can be drawn onto: a row-major canvas whose width is a power of two.
pub trait DrawDestination {
	fn widthLog2(&self) -> usize;
	fn putpixel(&mut self, atIndex: usize, withValue: u8);

	#[inline(always)]
	fn width(&self) -> usize {
		1 << self.widthLog2()
	}

	/*
		3D-isometric Block :

		1st line : draw a line of 4 pixels
		2nd line : draw a line of 8 pixels
		3rd line : draw a line of 12 pixels
		and so on...
	*/
	fn drawBlockIsometric<R: Read + ?Sized>(
		&mut self,
		x0: usize,
		y0: usize,
		length: i32,
		data: &mut R,
	) -> Result<(), DecodeError> {
		if length != ISOMETRIC_LENGTH {
			return Err(DecodeError::IsometricLength { expected: ISOMETRIC_LENGTH, actual: length });
		}

		let (line, widthLog2) = (&mut [0; BLOCK_WIDTH], self.widthLog2());
		for (y, (&xjump, &nbpix)) in XJUMP.iter().zip(&NBPIX).enumerate() {
			let line = &mut line[..nbpix as usize];
			data.read_exact(line)?;
			let j = ((y0 + y) << widthLog2) + x0 + xjump as usize;
			for (i, &pixel) in line.iter().enumerate() {
				self.putpixel(j + i, pixel);
			}
		}
		Ok(())
	}

	/*
		RLE Block :

		1st byte is pixels to "jump", 2nd is number of "solid" pixels, followed by the pixel color indexes.
		when 1st and 2nd bytes are 0 and 0, next line.
	*/
	fn drawBlockNormal<R: Read + ?Sized>(
		&mut self,
		x0: usize,
		y0: usize,
		length: i32,
		data: &mut R,
	) -> Result<(), DecodeError> {
		let (mut length, widthLog2) = (length, self.widthLog2());
		let (run, mut x, mut y) = (&mut [0; u8::MAX as usize], 0, 0);
		while length > 0 {
			if length < 2 {
				return Err(DecodeError::LengthUnderflow { remaining: length, needed: 2 });
			}
			let (xjump, xsolid) = (data.read_u8()?, data.read_u8()?);
			length -= 2;
			if xjump == 0 && xsolid == 0 {
				x = 0;
				y += 1;
				continue;
			}

			x += xjump as usize;
			if i32::from(xsolid) > length {
				return Err(DecodeError::LengthUnderflow { remaining: length, needed: xsolid.into() });
			}
			length -= i32::from(xsolid);
			let run = &mut run[..xsolid as usize];
			data.read_exact(run)?;
			if run.is_empty() {
				continue;
			}
			// Columns past the block width spill over into the next row.
			let last = x + (y << BLOCK_WIDTH_LOG2) + run.len() - 1;
			if last >= NUM_PIXELS {
				return Err(DecodeError::OutOfBlock { index: last });
			}
			let j = ((y0 + y) << widthLog2) + x0 + x;
			for (i, &pixel) in run.iter().enumerate() {
				self.putpixel(j + i, pixel);
			}
			x += run.len();
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use {super::*, std::io::Cursor};

	fn decode(format: i16, length: i32, data: &[u8]) -> Result<Pixels, DecodeError> {
		Pixels::decode(format, length, &mut Cursor::new(data))
	}

	#[test]
	fn isometric_tables_cover_256_bytes_inside_the_block() {
		assert_eq!(NBPIX.iter().map(|&n| i32::from(n)).sum::<i32>(), ISOMETRIC_LENGTH);
		for (&xjump, &nbpix) in XJUMP.iter().zip(&NBPIX) {
			assert_eq!(usize::from(xjump) * 2 + usize::from(nbpix), BLOCK_WIDTH);
		}
	}

	#[test]
	fn isometric_places_bytes_row_by_row() {
		let data: Vec<u8> = (0..=255).collect();
		let pixels = decode(ISOMETRIC_FORMAT, 256, &data).unwrap();
		let pixels = pixels.asArray();
		assert_eq!(pixels[14], 0);
		assert_eq!(pixels[17], 3);
		assert_eq!(pixels[44], 4);
		assert_eq!(pixels[13], 0);
		assert_eq!(pixels[18], 0);

		let mut k = 0;
		for (y, (&xjump, &nbpix)) in XJUMP.iter().zip(&NBPIX).enumerate() {
			for offset in 0..usize::from(nbpix) {
				assert_eq!(usize::from(pixels[usize::from(xjump) + offset + y * BLOCK_WIDTH]), k);
				k += 1;
			}
		}
		assert_eq!(k, 256);
		assert!(pixels[15 * BLOCK_WIDTH..].iter().all(|&pixel| pixel == 0));
	}

	#[test]
	fn isometric_rejects_other_lengths() {
		let data = [7; 256];
		match decode(ISOMETRIC_FORMAT, 200, &data) {
			Err(DecodeError::IsometricLength { expected: 256, actual: 200 }) => {}
			other => panic!("{other:?}"),
		}
	}

	#[test]
	fn isometric_short_data_is_io_error() {
		assert!(matches!(decode(ISOMETRIC_FORMAT, 256, &[1; 100]), Err(DecodeError::Io(_))));
	}

	#[test]
	fn normal_skips_runs_and_ends_rows() {
		let pixels = decode(0, 7, &[2, 3, 9, 9, 9, 0, 0]).unwrap();
		assert_eq!(pixels.get(0, 0), Some(0));
		assert_eq!(pixels.get(1, 0), Some(0));
		assert_eq!(pixels.get(2, 0), Some(9));
		assert_eq!(pixels.get(3, 0), Some(9));
		assert_eq!(pixels.get(4, 0), Some(9));
		assert_eq!(pixels.get(5, 0), Some(0));
		assert_eq!(pixels.asArray().iter().filter(|&&pixel| pixel != 0).count(), 3);
	}

	#[test]
	fn normal_continues_on_the_next_row() {
		#[rustfmt::skip]
		let data = [
			1, 2, 5, 6,
			3, 1, 7,
			0, 0,
			0, 1, 8,
		];
		let pixels = decode(0, data.len() as _, &data).unwrap();
		assert_eq!(pixels.get(1, 0), Some(5));
		assert_eq!(pixels.get(2, 0), Some(6));
		assert_eq!(pixels.get(6, 0), Some(7));
		assert_eq!(pixels.get(0, 1), Some(8));
	}

	#[test]
	fn normal_ignores_any_non_isometric_format() {
		let data = [0, 2, 4, 5];
		assert_eq!(decode(0, 4, &data).unwrap(), decode(-3, 4, &data).unwrap());
	}

	#[test]
	fn normal_rejects_run_longer_than_remaining_length() {
		match decode(0, 4, &[0, 3, 1, 2, 3]) {
			Err(DecodeError::LengthUnderflow { remaining: 2, needed: 3 }) => {}
			other => panic!("{other:?}"),
		}
	}

	#[test]
	fn normal_rejects_odd_trailing_byte() {
		match decode(0, 3, &[0, 0, 0]) {
			Err(DecodeError::LengthUnderflow { remaining: 1, needed: 2 }) => {}
			other => panic!("{other:?}"),
		}
	}

	#[test]
	fn normal_run_wraps_past_the_last_column() {
		let pixels = decode(0, 6, &[30, 4, 1, 2, 3, 4]).unwrap();
		assert_eq!(&pixels.asArray()[30..34], &[1, 2, 3, 4]);
		assert_eq!((pixels.get(31, 0), pixels.get(0, 1), pixels.get(1, 1)), (Some(2), Some(3), Some(4)));

		let pixels = decode(0, 4, &[32, 2, 5, 6]).unwrap();
		assert_eq!((pixels.get(0, 1), pixels.get(1, 1)), (Some(5), Some(6)));
	}

	#[test]
	fn normal_rejects_pixels_past_the_buffer_end() {
		let mut data = [0; 2 * 31].to_vec();
		data.extend([30, 4, 1, 2, 3, 4]);
		match decode(0, data.len() as _, &data) {
			Err(DecodeError::OutOfBlock { index: 1025 }) => {}
			other => panic!("{other:?}"),
		}
	}

	#[test]
	fn zero_length_normal_block_is_blank() {
		let pixels = decode(0, 0, &[]).unwrap();
		assert!(pixels.asArray().iter().all(|&pixel| pixel == 0));
		assert_eq!(pixels.rows().count(), BLOCK_HEIGHT);
	}

	#[test]
	fn draws_onto_wider_destination_at_offset() {
		struct Canvas(Vec<u8>);
		impl DrawDestination for Canvas {
			fn widthLog2(&self) -> usize {
				6
			}
			fn putpixel(&mut self, atIndex: usize, withValue: u8) {
				self.0[atIndex] = withValue;
			}
		}

		let mut canvas = Canvas(vec![0; 64 * 64]);
		canvas.drawBlockNormal(32, 2, 3, &mut Cursor::new([1_u8, 1, 42])).unwrap();
		assert_eq!(canvas.width(), 64);
		assert_eq!(canvas.0[2 * 64 + 32 + 1], 42);
	}
}
