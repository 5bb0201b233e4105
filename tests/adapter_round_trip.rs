use blockraster::adapter::{AdapterKind, BlockAdapter};
use blockraster::factory::{open_adapted, RasterFileFactory};
use blockraster::indicator::{BlockAccessEvent, BlockAccessIndicator, BlockAccessListener};
use blockraster::raster::PixelType;
use blockraster::resolution::{
    AccessMode, BlockError, BlockType, MemoryRasterCreator, MemoryStore, ResolutionDescriptor,
    ResolutionEditor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn factory_with(store: &MemoryStore) -> RasterFileFactory {
    let mut factory = RasterFileFactory::new();
    factory.register(Arc::new(MemoryRasterCreator::new(store.clone())));
    factory
}

#[test]
fn test_single_block_round_trip() {
    let store = MemoryStore::new();
    let descriptor =
        ResolutionDescriptor::new(0, (2, 4), (2, 4), BlockType::Image, PixelType::gray8()).unwrap();
    store.create("mem://round-trip", vec![descriptor]).unwrap();
    let factory = factory_with(&store);

    {
        let file = factory.open("mem://round-trip", AccessMode::CREATE).unwrap();
        let mut writer =
            open_adapted(file.as_ref(), 0, BlockType::Line, AccessMode::CREATE).unwrap();
        assert_eq!(writer.kind(), AdapterKind::ImageToLine);
        let rows: [[u8; 2]; 4] = [[0x00, 0x01], [0x02, 0x03], [0x04, 0x05], [0x06, 0x07]];
        for (y, row) in rows.iter().enumerate() {
            writer.write_block(0, y as u64, row).unwrap();
        }
        assert_eq!(writer.next_line_to_write(), Some(4));
    }

    let file = factory.open("mem://round-trip", AccessMode::READ).unwrap();
    let mut reader = open_adapted(file.as_ref(), 0, BlockType::Line, AccessMode::READ).unwrap();
    let mut bytes = Vec::new();
    let mut line = [0u8; 2];
    for y in 0..4 {
        reader.read_block(0, y, &mut line).unwrap();
        bytes.extend_from_slice(&line);
    }
    assert_eq!(bytes, vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
}

#[test]
fn test_strip_round_trip_with_partial_last_strip() {
    let store = MemoryStore::new();
    let descriptor =
        ResolutionDescriptor::new(0, (3, 7), (3, 3), BlockType::Strip, PixelType::rgb8()).unwrap();
    let raster = store.create("mem://strips", vec![descriptor]).unwrap();

    let mut writer = BlockAdapter::new(
        Box::new(raster.editor(0, AccessMode::CREATE).unwrap()),
        BlockType::Line,
    )
    .unwrap();
    assert_eq!(writer.kind(), AdapterKind::StripToLine);
    let line_of = |y: u8| -> Vec<u8> { (0..9).map(|i| y * 10 + i).collect() };
    for y in 0..7u8 {
        writer.write_block(0, y as u64, &line_of(y)).unwrap();
    }

    // 直接读取原生条带,最后一个条带只有一行有效数据
    let mut native = raster.editor(0, AccessMode::READ).unwrap();
    let mut strip = vec![0u8; 27];
    native.read_block(0, 6, &mut strip).unwrap();
    assert_eq!(&strip[..9], line_of(6).as_slice());
    assert!(strip[9..].iter().all(|b| *b == 0));

    let mut reader = BlockAdapter::new(Box::new(native), BlockType::Line).unwrap();
    let mut line = vec![0u8; 9];
    for y in (0..7u8).rev() {
        reader.read_block(0, y as u64, &mut line).unwrap();
        assert_eq!(line, line_of(y));
    }
}

#[test]
fn test_tiles_round_trip_through_image() {
    let store = MemoryStore::new();
    let descriptor =
        ResolutionDescriptor::new(0, (5, 3), (2, 2), BlockType::Tile, PixelType::gray_alpha8())
            .unwrap();
    store.create("mem://tiles", vec![descriptor]).unwrap();
    let factory = factory_with(&store);
    let file = factory.open("mem://tiles", AccessMode::READ_WRITE).unwrap();

    let image: Vec<u8> = (0..30).collect();
    let mut adapter =
        open_adapted(file.as_ref(), 0, BlockType::Image, AccessMode::READ_WRITE).unwrap();
    assert_eq!(adapter.kind(), AdapterKind::TileToImage);
    adapter.write_block(0, 0, &image).unwrap();

    let mut tiles = file.create_editor(0, AccessMode::READ).unwrap();
    let mut tile = vec![0u8; 8];
    tiles.read_block(4, 2, &mut tile).unwrap();
    assert_eq!(tile, vec![28, 29, 0, 0, 0, 0, 0, 0]);

    let mut out = vec![0u8; 30];
    adapter.read_block(0, 0, &mut out).unwrap();
    assert_eq!(out, image);
}

#[derive(Default)]
struct WriteErrors {
    count: AtomicUsize,
    last: Mutex<Option<String>>,
}

impl BlockAccessListener for WriteErrors {
    fn write_block_error(&self, event: &BlockAccessEvent<'_>) {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(format!("{}", event.error));
    }
}

#[test]
fn test_out_of_order_write_notifies_indicator() {
    let store = MemoryStore::new();
    let descriptor =
        ResolutionDescriptor::new(0, (2, 4), (2, 4), BlockType::Image, PixelType::gray8()).unwrap();
    let raster = store.create("mem://order", vec![descriptor]).unwrap();

    let indicator = Arc::new(BlockAccessIndicator::new());
    let errors = Arc::new(WriteErrors::default());
    indicator.add_listener(errors.clone());

    let mut writer = BlockAdapter::new(
        Box::new(raster.editor(0, AccessMode::CREATE).unwrap()),
        BlockType::Line,
    )
    .unwrap()
    .with_indicator(indicator);

    assert!(matches!(
        writer.write_block(0, 1, &[1, 1]),
        Err(BlockError::OutOfOrderWrite((0, 1)))
    ));
    assert_eq!(errors.count.load(Ordering::SeqCst), 1);
    assert!(errors
        .last
        .lock()
        .unwrap()
        .as_deref()
        .is_some_and(|msg| msg.contains("OutOfOrderWrite")));

    // 被拒绝的写入没有改变任何状态
    writer.write_block(0, 0, &[1, 1]).unwrap();
    assert_eq!(writer.next_line_to_write(), Some(1));
}

#[test]
fn test_unknown_location_has_no_creator() {
    let factory = factory_with(&MemoryStore::new());
    assert!(factory.find_creator_for("https://example.com/wms").is_none());
    assert!(matches!(
        factory.open("mem://missing", AccessMode::READ),
        Err(BlockError::NoCreator(_))
    ));
}
