use orc_reader::read::{ColumnLoad, FilterValues, MemoryProvider, Reader, ReaderOptions};

use crate::open;
use crate::writer::{FileBuilder, Values};

fn file() -> (Vec<Option<i64>>, Vec<Option<String>>, Vec<u8>) {
    let integers = (0..3000)
        .map(|i| if i % 10 == 3 { None } else { Some(i as i64 - 1500) })
        .collect::<Vec<_>>();
    let strings = (0..3000)
        .map(|i| if i % 4 == 0 { None } else { Some(format!("s{i}")) })
        .collect::<Vec<_>>();
    let file = FileBuilder::new(128)
        .block_size(512)
        .stripe_rows(1024)
        .column("i", Values::Long(integers.clone()))
        .column("s", Values::String(strings.clone()))
        .build();
    (integers, strings, file)
}

#[tokio::test]
async fn load_columns_async_matches_sync() {
    let (integers, strings, file) = file();
    let reader = Reader::open_async(
        MemoryProvider::new(file.clone()),
        ReaderOptions::default().with_tail_window(64),
    )
    .await
    .unwrap();
    let sync = open(file);
    assert_eq!(reader.tail(), sync.tail());

    let i = reader.get_column("i").unwrap();
    let s = reader.get_column("s").unwrap();
    let mut ints = reader.create_integer_column_buffer(&i).unwrap();
    let mut strs = reader.create_string_column_buffer(&s).unwrap();
    let mut expected = sync.create_integer_column_buffer(&i).unwrap();

    for stripe in 0..reader.number_of_stripes() {
        for row_group in 0..reader.number_of_row_groups(stripe).unwrap() {
            {
                let mut buffers: [&mut dyn ColumnLoad<MemoryProvider>; 2] =
                    [&mut ints, &mut strs];
                reader
                    .load_columns_async(stripe, row_group, &mut buffers)
                    .await
                    .unwrap();
            }
            let start = stripe * 1024 + row_group * 128;
            let end = (start + 128).min(3000);
            assert_eq!(ints.values(), &integers[start..end]);
            assert_eq!(strs.values(), &strings[start..end]);

            sync.load_data(stripe, row_group, &mut expected).unwrap();
            assert_eq!(ints.values(), expected.values());
        }
    }
}

#[tokio::test]
async fn concurrent_readers_share_caches() {
    let (integers, _, file) = file();
    let reader = std::sync::Arc::new(open(file));
    let column = reader.get_column("i").unwrap();

    let tasks = (0..reader.number_of_stripes())
        .map(|stripe| {
            let reader = reader.clone();
            let column = column.clone();
            tokio::spawn(async move {
                let mut buffer = reader.create_integer_column_buffer(&column).unwrap();
                let mut read = vec![];
                for row_group in 0..reader.number_of_row_groups(stripe).unwrap() {
                    reader
                        .load_data_async(stripe, row_group, &mut buffer)
                        .await
                        .unwrap();
                    read.extend_from_slice(buffer.values());
                }
                read
            })
        })
        .collect::<Vec<_>>();

    let mut read = vec![];
    for task in tasks {
        read.extend(task.await.unwrap());
    }
    assert_eq!(read, integers);
}

#[tokio::test]
async fn filter_row_groups_async() {
    let (_, _, file) = file();
    let reader = open(file);
    let column = reader.get_column("i").unwrap();
    // rows 1024..2048 hold -476..548
    let filter = FilterValues::integer(0, 100).unwrap();
    let selected = reader
        .filter_row_groups_async(1, &column, &filter)
        .await
        .unwrap();
    assert_eq!(selected, reader.filter_row_groups(1, &column, &filter).unwrap());
    assert_eq!(selected, [3, 4]);
}

#[test]
fn load_columns() {
    let (integers, strings, file) = file();
    let reader = open(file);
    let i = reader.get_column("i").unwrap();
    let s = reader.get_column("s").unwrap();
    let mut ints = reader.create_integer_column_buffer(&i).unwrap();
    let mut strs = reader.create_string_column_buffer(&s).unwrap();

    {
        let mut buffers: [&mut dyn ColumnLoad<MemoryProvider>; 2] = [&mut strs, &mut ints];
        assert_eq!(buffers[0].column().name, "s");
        reader.load_columns(2, 7, &mut buffers).unwrap();
    }
    assert_eq!(ints.values(), &integers[2048 + 896..]);
    assert_eq!(strs.values(), &strings[2048 + 896..]);
}
