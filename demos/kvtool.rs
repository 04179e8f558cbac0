//! Command-line tool for poking at a store inside a flash image file.
//!
//! The image is treated as a 4 KiB-sector NOR device; `format` erases
//! the chosen partition, after which `put`/`get`/`delete`/`list` drive
//! the store. Create an image with e.g.
//! `dd if=/dev/zero bs=4096 count=16 | tr '\0' '\377' > kvs.img`.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::{bail, Context};
use clap::Parser;

use norkv::{Crc16Checksum, Flash, Partition, Store};

const SECTOR_SIZE: u32 = 4096;
const PARTITION_ALIGNMENT: u32 = 16;

/// Per-deployment entry magic; images written by this tool are only
/// readable by this tool.
const MAGIC: u32 = 0x6E6F_724B;

#[derive(Parser)]
struct Kvtool {
    image_file: std::path::PathBuf,

    /// First sector of the store partition.
    #[arg(long, default_value_t = 0)]
    start_sector: u32,

    /// Number of sectors in the partition (default: the rest of the
    /// image).
    #[arg(long)]
    sectors: Option<u32>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::Subcommand)]
enum Cmd {
    /// Erase the partition, leaving an empty store.
    Format,
    /// Store a value under a key.
    Put { key: String, value: String },
    /// Hex-dump the value stored under a key.
    Get { key: String },
    /// Delete a key.
    Delete { key: String },
    /// List keys and value sizes.
    List,
}

fn main() -> anyhow::Result<()> {
    let args = Kvtool::parse();

    let mut img = FlashImage::open(&args.image_file).with_context(|| {
        format!("opening image file {}", args.image_file.display())
    })?;

    let device_sectors = img.sector_count();
    if args.start_sector >= device_sectors {
        bail!("start sector {} is past the end of the image", args.start_sector);
    }
    let sectors = args
        .sectors
        .unwrap_or(device_sectors - args.start_sector);

    let partition =
        Partition::new(&mut img, args.start_sector, sectors, PARTITION_ALIGNMENT)
            .map_err(|e| anyhow::anyhow!("bad partition geometry: {e:?}"))?;

    if let Cmd::Format = args.cmd {
        let mut partition = partition;
        partition
            .erase_all()
            .map_err(|e| anyhow::anyhow!("erase failed: {e:?}"))?;
        println!("formatted {sectors} sectors");
        return Ok(());
    }

    let mut store: Store<_, _, 256, 256> =
        Store::new(partition, MAGIC, Crc16Checksum::new())
            .map_err(|e| anyhow::anyhow!("store geometry rejected: {e:?}"))?;
    store
        .init()
        .map_err(|e| anyhow::anyhow!("mount failed: {e:?}"))?;

    match args.cmd {
        Cmd::Format => unreachable!(),
        Cmd::Put { key, value } => {
            store
                .put(key.as_bytes(), value.as_bytes())
                .map_err(|e| anyhow::anyhow!("put failed: {e:?}"))?;
            println!("ok");
        }
        Cmd::Get { key } => {
            let mut out = vec![0u8; norkv::MAX_VALUE_LENGTH];
            match store.get(key.as_bytes(), &mut out) {
                Ok(n) => println!("{}", pretty_hex::pretty_hex(&&out[..n])),
                Err(e) => println!("error: {e:?}"),
            }
        }
        Cmd::Delete { key } => match store.delete(key.as_bytes()) {
            Ok(()) => println!("ok"),
            Err(e) => println!("error: {e:?}"),
        },
        Cmd::List => {
            let mut count = 0usize;
            for item in store.iter() {
                let item = item.map_err(|e| anyhow::anyhow!("iteration failed: {e:?}"))?;
                println!(
                    "{} ({} bytes)",
                    String::from_utf8_lossy(item.key()),
                    item.value_size(),
                );
                count += 1;
            }
            println!("{count} keys");
        }
    }

    Ok(())
}

/// A flash image file: plain bytes, one 4 KiB sector after another.
struct FlashImage {
    file: RefCell<std::fs::File>,
    sectors: u32,
}

impl FlashImage {
    fn open(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(false)
            .open(path)?;
        let file_len = file.metadata()?.len();

        if file_len % u64::from(SECTOR_SIZE) != 0 {
            bail!("file is not a whole number of {SECTOR_SIZE}-byte sectors");
        }
        let sectors = u32::try_from(file_len / u64::from(SECTOR_SIZE))
            .context("file too large")?;

        Ok(Self { file: file.into(), sectors })
    }
}

impl Flash for FlashImage {
    type Error = std::io::Error;

    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    fn sector_count(&self) -> u32 {
        self.sectors
    }

    fn alignment(&self) -> u32 {
        1
    }

    fn read(&self, address: u32, out: &mut [u8]) -> Result<(), Self::Error> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(u64::from(address)))?;
        file.read_exact(out)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Self::Error> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(u64::from(address)))?;
        file.write_all(data)
    }

    fn erase(&mut self, address: u32, sectors: u32) -> Result<(), Self::Error> {
        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(u64::from(address)))?;
        let erased = [0xFFu8; SECTOR_SIZE as usize];
        for _ in 0..sectors {
            file.write_all(&erased)?;
        }
        Ok(())
    }
}
