#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	clap::Parser,
	d2sw_dt1::{
		dt1::{self, TileSet},
		stdoutRaw,
	},
	log::{error, info},
	serde::Serialize,
	std::{
		fs::File,
		io::{self, BufWriter, Read, Write},
		path::PathBuf,
		process::ExitCode,
	},
	thiserror::Error,
};

/// Decodes a DT1 tile set and dumps its catalog as TOML
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
	/// DT1 file to decode, stdin when absent
	input: Option<PathBuf>,

	/// Where to write the TOML, stdout when absent
	#[clap(short, long)]
	output: Option<PathBuf>,

	/// Include the 32x32 pixel indices of every block
	#[clap(long)]
	pixels: bool,
}

#[derive(Debug, Error)]
enum CliError {
	#[error("{0}")]
	Decode(#[from] dt1::Error),
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
	#[error("cannot serialize to TOML: {0}")]
	Toml(#[from] toml::ser::Error),
}

fn main() -> ExitCode {
	env_logger::init();
	match run(&Args::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("{err}");
			ExitCode::FAILURE
		}
	}
}

fn run(args: &Args) -> Result<(), CliError> {
	let tileSet = match &args.input {
		Some(path) => TileSet::open(path)?,
		None => {
			let dt1 = &mut Vec::new();
			io::stdin().read_to_end(dt1)?;
			TileSet::fromBytes(dt1)?
		}
	};
	info!(
		"decoded {} tiles with {} blocks",
		tileSet.numTiles(),
		tileSet.tiles().iter().map(dt1::Tile::numBlocks).sum::<usize>()
	);

	let toml = if args.pixels { toml::to_string(&tileSet)? } else { toml::to_string(&Catalog::new(&tileSet))? };
	let mut output: BufWriter<File> = BufWriter::new(match &args.output {
		Some(path) => File::create(path)?,
		None => stdoutRaw(),
	});
	output.write_all(toml.as_bytes())?;
	output.flush()?;
	Ok(())
}

/// The tile set without block pixels.
#[derive(Serialize)]
struct Catalog<'a> {
	x1: i32,
	x2: i32,
	tileHeadersPointer: i32,

	#[serde(rename = "tile")]
	tiles: Vec<CatalogTile<'a>>,
}

#[derive(Serialize)]
struct CatalogTile<'a> {
	#[serde(flatten)]
	header: &'a dt1::TileHeader,

	#[serde(rename = "block")]
	blocks: Vec<&'a dt1::BlockHeader>,
}

impl<'a> Catalog<'a> {
	fn new(tileSet: &'a TileSet) -> Self {
		Self {
			x1: tileSet.x1(),
			x2: tileSet.x2(),
			tileHeadersPointer: tileSet.tileHeadersPointer(),
			tiles: tileSet
				.tiles()
				.iter()
				.map(|tile| CatalogTile {
					header: &tile.header,
					blocks: tile.blocks.iter().map(|block| &block.header).collect(),
				})
				.collect(),
		}
	}
}
