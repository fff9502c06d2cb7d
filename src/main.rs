use clap::{Arg, ArgAction, Command};
use exhume_ewf::handle::EwfHandle;
use exhume_ewf::read_io::ErrorPolicy;
use log::error;
use std::io::{Read, Seek, SeekFrom};

fn cmd_info(path: &str) {
    let mut handle = match EwfHandle::open_read(path, exhume_ewf::chunk_cache::DEFAULT_CAPACITY, ErrorPolicy::ZeroFill) {
        Ok(h) => h,
        Err(err) => {
            error!("Error opening '{}': {}", path, err);
            std::process::exit(1);
        }
    };

    println!("Evidence        : {}", path);
    println!("Format variant  : {:?}", handle.format_variant());
    println!("Media size      : {} bytes", handle.media().media_size);
    println!("Bytes/sector    : {}", handle.media().bytes_per_sector);
    println!("Sectors/chunk   : {}", handle.media().sectors_per_chunk);
    if let Some(case_number) = handle.header_value("case_number") {
        println!("Case number     : {}", case_number);
    }
    if let Some(examiner) = handle.header_value("examiner_name") {
        println!("Examiner        : {}", examiner);
    }
    if let Some(md5) = handle.hash_value("MD5") {
        println!("MD5             : {}", md5);
    }
    if let Some(sha1) = handle.hash_value("SHA1") {
        println!("SHA1            : {}", sha1);
    }
    println!("Sessions        : {}", handle.sessions().len());
    println!("Tracks          : {}", handle.tracks().len());
    println!("Checksum errors : {}", handle.checksum_errors().len());
}

fn cmd_read(path: &str, size: usize, offset: u64) {
    let mut handle = match EwfHandle::open_read(path, exhume_ewf::chunk_cache::DEFAULT_CAPACITY, ErrorPolicy::ZeroFill) {
        Ok(h) => h,
        Err(err) => {
            error!("Error opening '{}': {}", path, err);
            std::process::exit(1);
        }
    };

    if let Err(err) = handle.seek(SeekFrom::Start(offset)) {
        error!("Error seeking to offset {}: {}", offset, err);
        std::process::exit(1);
    }

    let mut buf = vec![0u8; size];
    let n = match handle.read(&mut buf) {
        Ok(n) => n,
        Err(err) => {
            error!("Error reading: {}", err);
            std::process::exit(1);
        }
    };
    let result = String::from_utf8_lossy(&buf[..n]);
    println!("{}", result);
}

fn main() {
    env_logger::init();

    let matches = Command::new("exhume_ewf")
        .version("1.0")
        .author("ForensicXlab")
        .about("Read and write Expert Witness Compression Format (EWF/Ex01/S01/L01) forensic disk images.")
        .subcommand_required(true)
        .subcommand(
            Command::new("info")
                .about("Print the header values, hash values, and acquisition metadata of an image.")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_parser(clap::value_parser!(String))
                        .required(true)
                        .help("Path to any segment of the image."),
                ),
        )
        .subcommand(
            Command::new("read")
                .about("Read a range of bytes from an image's media stream.")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_parser(clap::value_parser!(String))
                        .required(true)
                        .help("Path to any segment of the image."),
                )
                .arg(
                    Arg::new("size")
                        .short('s')
                        .long("size")
                        .value_parser(clap::value_parser!(usize))
                        .required(true)
                        .help("The number of bytes to read."),
                )
                .arg(
                    Arg::new("offset")
                        .short('o')
                        .long("offset")
                        .value_parser(clap::value_parser!(u64))
                        .required(false)
                        .help("Read starting at this media offset."),
                )
                .arg(Arg::new("verbose").short('v').long("verbose").action(ArgAction::SetTrue)),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("info", sub)) => {
            let path = sub.get_one::<String>("input").unwrap();
            cmd_info(path);
        }
        Some(("read", sub)) => {
            let path = sub.get_one::<String>("input").unwrap();
            let size = *sub.get_one::<usize>("size").unwrap();
            let offset = sub.get_one::<u64>("offset").copied().unwrap_or(0);
            cmd_read(path, size, offset);
        }
        _ => unreachable!("clap enforces subcommand_required"),
    }
}
