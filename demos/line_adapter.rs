// 按行写入一个以条带存储的内存栅格,再按行读回
use blockraster::{
    open_adapted, AccessMode, BlockType, PixelType, RasterFileFactory, ResolutionDescriptor,
    ResolutionEditor,
};
use blockraster::resolution::{MemoryRasterCreator, MemoryStore};
use std::sync::Arc;
use std::time::Instant;

const LOCATION: &str = "mem://demo/strips"; // 栅格位置
const WIDTH: u64 = 512; // 栅格宽度
const HEIGHT: u64 = 300; // 栅格高度
const STRIP_HEIGHT: u32 = 64; // 每个条带的行数

fn main() {
    println!("Example: blockraster line adapter");

    // 初始化日志记录器
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_ids(true)
        .init();

    let store = MemoryStore::new();
    let descriptor = ResolutionDescriptor::new(
        0,
        (WIDTH, HEIGHT),
        (WIDTH as u32, STRIP_HEIGHT),
        BlockType::Strip,
        PixelType::rgb8(),
    )
    .unwrap();
    store.create(LOCATION, vec![descriptor]).unwrap();

    let mut factory = RasterFileFactory::new();
    factory.register(Arc::new(MemoryRasterCreator::new(store)));

    // 按顺序写入每一行
    let t_write = Instant::now();
    let file = factory.open(LOCATION, AccessMode::CREATE).unwrap();
    let mut writer = open_adapted(file.as_ref(), 0, BlockType::Line, AccessMode::CREATE).unwrap();
    println!("Adapter: {:?}", writer.kind());
    let mut line = vec![0u8; WIDTH as usize * 3];
    for y in 0..HEIGHT {
        for (i, byte) in line.iter_mut().enumerate() {
            *byte = ((i as u64 + y) % 256) as u8;
        }
        writer.write_block(0, y, &line).unwrap();
    }
    println!(
        "Wrote {HEIGHT} lines in {:.3}ms",
        t_write.elapsed().as_micros() as f64 / 1000.0
    );

    // 重新打开并逐行校验
    let t_read = Instant::now();
    let file = factory.open(LOCATION, AccessMode::READ).unwrap();
    let mut reader = open_adapted(file.as_ref(), 0, BlockType::Line, AccessMode::READ).unwrap();
    let mut mismatches = 0;
    for y in 0..HEIGHT {
        reader.read_block(0, y, &mut line).unwrap();
        let expected = line
            .iter()
            .enumerate()
            .all(|(i, byte)| *byte == ((i as u64 + y) % 256) as u8);
        if !expected {
            mismatches += 1;
        }
    }
    println!(
        "Read {HEIGHT} lines in {:.3}ms, {mismatches} mismatched",
        t_read.elapsed().as_micros() as f64 / 1000.0
    );
}
