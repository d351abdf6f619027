use orc_reader::read::{
    ByteRangeProvider, FileProvider, MemoryProvider, MmapProvider, Reader, ReaderOptions,
};
use orc_reader::Error;

use crate::{init_logger, CountingProvider};
use crate::writer::{FileBuilder, Values};

fn values() -> Vec<Option<i64>> {
    (0..1000).map(|i| if i % 2 == 0 { Some(i) } else { None }).collect()
}

fn file() -> Vec<u8> {
    init_logger();
    FileBuilder::new(128)
        .stripe_rows(256)
        .column("a", Values::Long(values()))
        .build()
}

fn read_all<P: ByteRangeProvider>(reader: &Reader<P>) -> Vec<Option<i64>> {
    let column = reader.get_column("a").unwrap();
    let mut buffer = reader.create_integer_column_buffer(&column).unwrap();
    let mut read = vec![];
    for stripe in 0..reader.number_of_stripes() {
        for row_group in 0..reader.number_of_row_groups(stripe).unwrap() {
            reader.load_data(stripe, row_group, &mut buffer).unwrap();
            read.extend_from_slice(buffer.values());
        }
    }
    read
}

#[test]
fn one_request_with_the_default_window() {
    let reader = Reader::open(CountingProvider::new(file()), ReaderOptions::default()).unwrap();
    assert_eq!(reader.provider().requests(), 1);
    assert_eq!(reader.tail().number_of_rows(), 1000);
    assert_eq!(reader.number_of_stripes(), 4);
}

#[test]
fn small_window_needs_a_second_request() {
    let options = ReaderOptions::default().with_tail_window(48);
    let reader = Reader::open(CountingProvider::new(file()), options).unwrap();
    assert_eq!(reader.provider().requests(), 2);
    assert_eq!(read_all(&reader), values());
}

#[test]
fn corrupt_magic() {
    let mut file = file();
    let postscript_length = *file.last().unwrap() as usize;
    let start = file.len() - 1 - postscript_length;
    let position = file[start..]
        .windows(3)
        .position(|x| x == b"ORC")
        .unwrap();
    file[start + position + 2] = b'K';

    assert!(matches!(
        Reader::open(MemoryProvider::new(file), ReaderOptions::default()),
        Err(Error::CorruptFile(_))
    ));
}

#[test]
fn local_files() {
    let path = std::env::temp_dir().join(format!("orc-reader-tail-{}.orc", std::process::id()));
    std::fs::write(&path, file()).unwrap();

    let file_reader = Reader::open(FileProvider::open(&path).unwrap(), ReaderOptions::default())
        .unwrap();
    let mmap_reader = Reader::open(MmapProvider::open(&path).unwrap(), ReaderOptions::default())
        .unwrap();
    assert_eq!(file_reader.tail(), mmap_reader.tail());
    assert_eq!(read_all(&file_reader), values());
    assert_eq!(read_all(&mmap_reader), values());

    drop(mmap_reader);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn missing_file() {
    assert!(matches!(
        FileProvider::open("/this/path/does/not/exist.orc"),
        Err(Error::Io(_))
    ));
}

#[tokio::test]
async fn open_async_with_a_small_window() {
    let options = ReaderOptions::default().with_tail_window(8);
    let reader = Reader::open_async(CountingProvider::new(file()), options)
        .await
        .unwrap();
    assert_eq!(reader.provider().requests(), 3);
    assert_eq!(read_all(&reader), values());
}
