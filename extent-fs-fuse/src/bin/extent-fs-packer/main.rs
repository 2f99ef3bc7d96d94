mod cli;

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use extent_fs::{
    BLOCK_SIZE, Error, ExtentFileSystem, FormatOptions, Inode, InodeKind,
    MountOptions, SizePolicy,
};
use extent_fs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

use self::cli::{Cli, Command};

fn main() -> io::Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Pack {
            source,
            image,
            size_mib,
            inodes,
            policy,
        } => pack(&source, &image, size_mib, inodes, policy.into()),
        Command::Inspect { image } => inspect(&image),
    }
}

fn pack(source: &Path, image: &Path, size_mib: u64, inodes: u32, policy: SizePolicy) -> io::Result<()> {
    println!("source={source:?}\nimage={image:?}");

    let disk_size = ByteSizeIec::mib(size_mib).0;
    let format = FormatOptions::fit(disk_size as usize / BLOCK_SIZE, inodes)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "image too small"))?;

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(image)?;
    fd.set_len(disk_size)?;

    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd));
    let efs = ExtentFileSystem::format(
        block_dev,
        format,
        MountOptions {
            size_policy: policy,
        },
    )
    .map_err(into_io)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let data = fs::read(entry.path())?;
        let inode = Inode::create(&efs, InodeKind::File, 0o644).map_err(into_io)?;
        inode
            .write_at(0, &data)
            .map_err(|error| into_io(error.error))?;
        log::info!(
            "file={:?} inode={} size={}",
            entry.file_name(),
            inode.id().get(),
            data.len()
        );
    }

    let efs = efs.lock();
    println!(
        "{} inodes free, {} of {} blocks free",
        efs.nr_free_inodes(),
        efs.nr_free_blocks(),
        efs.block_count()
    );
    Ok(())
}

fn inspect(image: &Path) -> io::Result<()> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd));
    let efs = ExtentFileSystem::open(block_dev, MountOptions::default()).map_err(into_io)?;
    let efs = efs.lock();

    println!(
        "inodes: {} free of {}\nblocks: {} free of {}",
        efs.nr_free_inodes(),
        efs.inode_count() - 1,
        efs.nr_free_blocks(),
        efs.block_count()
    );

    for id in efs.allocated_inodes() {
        let record = efs.lookup_inode(id).map_err(into_io)?;
        let extents: Vec<_> = record
            .extents
            .extents()
            .map(|extent| format!("{}+{}", extent.start.get(), extent.length))
            .collect();
        println!(
            "inode {:>4}: mode={:o} size={} capacity={} overflow={} extents=[{}]",
            id.get(),
            record.mode,
            record.size,
            record.extents.capacity(),
            record.overflow.len(),
            extents.join(", ")
        );
    }

    let report = efs.verify().map_err(into_io)?;
    if report.is_consistent() {
        println!("consistent");
    } else {
        println!("inconsistent: {report:?}, {} leaked blocks", report.leaked_blocks());
    }
    Ok(())
}

fn into_io(error: Error) -> io::Error {
    io::Error::from_raw_os_error(error.errno())
}
