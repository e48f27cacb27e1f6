use std::fs::{read_dir, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::exit;
use std::sync::{Arc, Mutex};

use chain_fs::{BlockDevice, FileSystem, FsError, FsResult, BLOCK_SZ};
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{LevelFilter, Log};

/// A disk image file exposed as a block device.
struct BlockFile(Mutex<File>);

impl BlockDevice for BlockFile {
  fn block_count(&self) -> usize {
    let file = match self.0.lock() {
      Ok(file) => file,
      Err(_) => return 0,
    };
    file.metadata().map(|m| m.len() as usize / BLOCK_SZ).unwrap_or(0)
  }

  fn read_block(&self, block_id: usize, buf: &mut [u8]) -> FsResult<()> {
    let mut file = self.0.lock().map_err(|_| FsError::Io)?;
    file
      .seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
      .map_err(|_| FsError::Io)?;
    file.read_exact(buf).map_err(|_| FsError::Io)
  }

  fn write_block(&self, block_id: usize, buf: &[u8]) -> FsResult<()> {
    let mut file = self.0.lock().map_err(|_| FsError::Io)?;
    file
      .seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
      .map_err(|_| FsError::Io)?;
    file.write_all(buf).map_err(|_| FsError::Io)
  }

  fn close(&self) -> FsResult<()> {
    let file = self.0.lock().map_err(|_| FsError::Io)?;
    file.sync_all().map_err(|_| FsError::Io)
  }
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
  fn enabled(&self, _metadata: &log::Metadata) -> bool {
    true
  }

  fn log(&self, record: &log::Record) {
    eprintln!("[{:5}] {}", record.level(), record.args());
  }

  fn flush(&self) {}
}

fn init_logging(verbose: bool) {
  log::set_max_level(if verbose { LevelFilter::Trace } else { LevelFilter::Warn });
  let _ = log::set_logger(&LOGGER);
}

fn main() {
  let matches = App::new("chain-fs image tool")
    .arg(
      Arg::with_name("verbose")
        .short("v")
        .long("verbose")
        .help("Log filesystem activity to stderr"),
    )
    .subcommand(
      SubCommand::with_name("format")
        .about("Create an empty filesystem image")
        .arg(Arg::with_name("image").required(true))
        .arg(
          Arg::with_name("blocks")
            .short("b")
            .long("blocks")
            .takes_value(true)
            .required(true)
            .help("Image size in blocks"),
        ),
    )
    .subcommand(
      SubCommand::with_name("info")
        .about("Print filesystem counters")
        .arg(Arg::with_name("image").required(true)),
    )
    .subcommand(
      SubCommand::with_name("ls")
        .about("List the files of an image")
        .arg(Arg::with_name("image").required(true)),
    )
    .subcommand(
      SubCommand::with_name("add")
        .about("Copy a host file into the image")
        .arg(Arg::with_name("image").required(true))
        .arg(Arg::with_name("file").required(true)),
    )
    .subcommand(
      SubCommand::with_name("rm")
        .about("Delete a file from the image")
        .arg(Arg::with_name("image").required(true))
        .arg(Arg::with_name("name").required(true)),
    )
    .subcommand(
      SubCommand::with_name("cat")
        .about("Write a file's content to stdout")
        .arg(Arg::with_name("image").required(true))
        .arg(Arg::with_name("name").required(true)),
    )
    .subcommand(
      SubCommand::with_name("stat")
        .about("Print a file's size")
        .arg(Arg::with_name("image").required(true))
        .arg(Arg::with_name("name").required(true)),
    )
    .subcommand(
      SubCommand::with_name("pack")
        .about("Format an image and add every file of a directory")
        .arg(Arg::with_name("image").required(true))
        .arg(
          Arg::with_name("source")
            .short("s")
            .long("source")
            .takes_value(true)
            .required(true)
            .help("Directory whose files get packed"),
        )
        .arg(
          Arg::with_name("blocks")
            .short("b")
            .long("blocks")
            .takes_value(true)
            .required(true)
            .help("Image size in blocks"),
        ),
    )
    .get_matches();

  init_logging(matches.is_present("verbose"));

  let outcome = match matches.subcommand() {
    ("format", Some(sub)) => cmd_format(sub),
    ("info", Some(sub)) => cmd_info(sub),
    ("ls", Some(sub)) => cmd_ls(sub),
    ("add", Some(sub)) => cmd_add(sub),
    ("rm", Some(sub)) => cmd_rm(sub),
    ("cat", Some(sub)) => cmd_cat(sub),
    ("stat", Some(sub)) => cmd_stat(sub),
    ("pack", Some(sub)) => cmd_pack(sub),
    _ => {
      eprintln!("{}", matches.usage());
      exit(2);
    }
  };
  if let Err(msg) = outcome {
    eprintln!("error: {}", msg);
    exit(1);
  }
}

fn open_image(path: &str) -> Result<Arc<BlockFile>, String> {
  let file = OpenOptions::new()
    .read(true)
    .write(true)
    .open(path)
    .map_err(|e| format!("{}: {}", path, e))?;
  Ok(Arc::new(BlockFile(Mutex::new(file))))
}

fn create_image(path: &str, blocks: usize) -> Result<Arc<BlockFile>, String> {
  let file = OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(true)
    .open(path)
    .map_err(|e| format!("{}: {}", path, e))?;
  file
    .set_len((blocks * BLOCK_SZ) as u64)
    .map_err(|e| format!("{}: {}", path, e))?;
  Ok(Arc::new(BlockFile(Mutex::new(file))))
}

fn mount_image(path: &str) -> Result<FileSystem, String> {
  let device = open_image(path)?;
  FileSystem::mount(device).map_err(|e| format!("{}: {}", path, e))
}

fn unmount(fs: FileSystem) -> Result<(), String> {
  fs.unmount().map_err(|(_, e)| e.to_string())
}

fn parse_blocks(args: &ArgMatches) -> Result<usize, String> {
  let blocks: usize = args
    .value_of("blocks")
    .unwrap()
    .parse()
    .map_err(|_| String::from("blocks must be a number"))?;
  if blocks > u16::MAX as usize {
    return Err(String::from("blocks must fit in 16 bits"));
  }
  Ok(blocks)
}

fn cmd_format(args: &ArgMatches) -> Result<(), String> {
  let path = args.value_of("image").unwrap();
  let device = create_image(path, parse_blocks(args)?)?;
  let fs = FileSystem::format(device).map_err(|e| e.to_string())?;
  unmount(fs)
}

fn cmd_info(args: &ArgMatches) -> Result<(), String> {
  let fs = mount_image(args.value_of("image").unwrap())?;
  let info = fs.info();
  println!("FS Info:");
  println!("total_blk_count={}", info.total_blocks);
  println!("fat_blk_count={}", info.fat_blocks);
  println!("rdir_blk={}", info.root_dir_block);
  println!("data_blk={}", info.data_start_block);
  println!("data_blk_count={}", info.data_blocks);
  println!("fat_free_ratio={}/{}", info.free_data_blocks, info.usable_data_blocks);
  println!("rdir_free_ratio={}/{}", info.free_dir_entries, info.dir_capacity);
  unmount(fs)
}

fn cmd_ls(args: &ArgMatches) -> Result<(), String> {
  let fs = mount_image(args.value_of("image").unwrap())?;
  println!("FS Ls:");
  for f in fs.ls() {
    println!("file: {}, size: {}, data_blk: {}", f.name, f.size, f.first_block);
  }
  unmount(fs)
}

fn cmd_add(args: &ArgMatches) -> Result<(), String> {
  let mut fs = mount_image(args.value_of("image").unwrap())?;
  let host_path = args.value_of("file").unwrap();
  let name = Path::new(host_path)
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| format!("{}: not a usable file name", host_path))?
    .to_string();
  let mut data = Vec::new();
  File::open(host_path)
    .and_then(|mut f| f.read_to_end(&mut data))
    .map_err(|e| format!("{}: {}", host_path, e))?;
  add_file(&mut fs, &name, &data)?;
  unmount(fs)
}

fn cmd_rm(args: &ArgMatches) -> Result<(), String> {
  let mut fs = mount_image(args.value_of("image").unwrap())?;
  let name = args.value_of("name").unwrap();
  fs.delete(name).map_err(|e| format!("{}: {}", name, e))?;
  unmount(fs)
}

fn cmd_cat(args: &ArgMatches) -> Result<(), String> {
  let mut fs = mount_image(args.value_of("image").unwrap())?;
  let name = args.value_of("name").unwrap();
  let fd = fs.open(name).map_err(|e| format!("{}: {}", name, e))?;
  let stdout = io::stdout();
  let mut out = stdout.lock();
  let mut buf = [0u8; BLOCK_SZ];
  loop {
    let n = fs.read(fd, &mut buf).map_err(|e| e.to_string())?;
    if n == 0 {
      break;
    }
    out.write_all(&buf[..n]).map_err(|e| e.to_string())?;
  }
  fs.close(fd).map_err(|e| e.to_string())?;
  unmount(fs)
}

fn cmd_stat(args: &ArgMatches) -> Result<(), String> {
  let mut fs = mount_image(args.value_of("image").unwrap())?;
  let name = args.value_of("name").unwrap();
  let fd = fs.open(name).map_err(|e| format!("{}: {}", name, e))?;
  let size = fs.stat(fd).map_err(|e| e.to_string())?;
  println!("size of file '{}' is {} bytes", name, size);
  fs.close(fd).map_err(|e| e.to_string())?;
  unmount(fs)
}

fn cmd_pack(args: &ArgMatches) -> Result<(), String> {
  let path = args.value_of("image").unwrap();
  let src = args.value_of("source").unwrap();
  let device = create_image(path, parse_blocks(args)?)?;
  let mut fs = FileSystem::format(device).map_err(|e| e.to_string())?;
  for dirent in read_dir(src).map_err(|e| format!("{}: {}", src, e))? {
    let dirent = dirent.map_err(|e| e.to_string())?;
    if !dirent.file_type().map_err(|e| e.to_string())?.is_file() {
      continue;
    }
    let name = match dirent.file_name().into_string() {
      Ok(name) => name,
      Err(_) => continue,
    };
    let mut data = Vec::new();
    File::open(dirent.path())
      .and_then(|mut f| f.read_to_end(&mut data))
      .map_err(|e| format!("{}: {}", name, e))?;
    add_file(&mut fs, &name, &data)?;
    println!("packed {} ({} bytes)", name, data.len());
  }
  unmount(fs)
}

fn add_file(fs: &mut FileSystem, name: &str, data: &[u8]) -> Result<(), String> {
  fs.create(name).map_err(|e| format!("{}: {}", name, e))?;
  let fd = fs.open(name).map_err(|e| e.to_string())?;
  let written = fs.write(fd, data).map_err(|e| e.to_string())?;
  fs.close(fd).map_err(|e| e.to_string())?;
  if written < data.len() {
    return Err(format!("{}: image full, wrote {} of {} bytes", name, written, data.len()));
  }
  Ok(())
}

#[test]
fn image_file_roundtrip() -> std::io::Result<()> {
  let path = std::env::temp_dir().join("chain-fs-test.img");
  let block_file = Arc::new(BlockFile(Mutex::new({
    let f = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .open(&path)?;
    f.set_len((512 * BLOCK_SZ) as u64)?;
    f
  })));
  let mut fs = FileSystem::format(block_file.clone()).unwrap();

  fs.create("filea").unwrap();
  fs.create("fileb").unwrap();
  for f in fs.ls() {
    println!("{}", f.name);
  }

  let fd = fs.open("filea").unwrap();
  let greet_str = "Hello, world!";
  assert_eq!(fs.write(fd, greet_str.as_bytes()).unwrap(), greet_str.len());
  fs.seek(fd, 0).unwrap();
  let mut buffer = [0u8; 233];
  let len = fs.read(fd, &mut buffer).unwrap();
  assert_eq!(greet_str.as_bytes(), &buffer[..len]);
  fs.close(fd).unwrap();

  let mut random_str_test = |len: usize| {
    fs.delete("filea").unwrap();
    fs.create("filea").unwrap();
    let mut str = String::new();
    for _ in 0..len {
      str.push(char::from('0' as u8 + rand::random::<u8>() % 10));
    }
    let fd = fs.open("filea").unwrap();
    assert_eq!(fs.write(fd, str.as_bytes()).unwrap(), len);
    fs.seek(fd, 0).unwrap();
    let mut read_buffer = [0u8; 127];
    let mut read_str = String::new();
    loop {
      let n = fs.read(fd, &mut read_buffer).unwrap();
      if n == 0 {
        break;
      }
      read_str.push_str(core::str::from_utf8(&read_buffer[..n]).unwrap());
    }
    fs.close(fd).unwrap();
    assert_eq!(str, read_str);
  };

  random_str_test(4 * BLOCK_SZ);
  random_str_test(8 * BLOCK_SZ + BLOCK_SZ / 2);
  random_str_test(100 * BLOCK_SZ);
  random_str_test(70 * BLOCK_SZ + BLOCK_SZ / 7);
  random_str_test(400 * BLOCK_SZ);

  fs.unmount().map_err(|(_, e)| e).unwrap();

  // filea was recreated into slot 0 every time, so it still lists first
  let mut fs = FileSystem::mount(block_file).unwrap();
  let names: Vec<String> = fs.ls().into_iter().map(|f| f.name).collect();
  assert_eq!(names, ["filea", "fileb"]);
  let fd = fs.open("fileb").unwrap();
  assert_eq!(fs.stat(fd).unwrap(), 0);
  fs.close(fd).unwrap();
  fs.unmount().map_err(|(_, e)| e).unwrap();

  Ok(())
}
