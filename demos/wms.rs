// 如果没有启用 "http" 和 "image" 特性，编译时会报错
#[cfg(not(all(feature = "http", feature = "image")))]
compile_error!("This example requires the ['http', 'image'] features");

use blockraster::codec::ImageFormat;
use blockraster::geometry::{PixelGrid, Region};
use blockraster::{
    HttpTileSource, ImageCodec, OgcEndpoint, PixelType, ResolutionEditor, ServiceConfig,
    ServiceRasterFile,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WMS_URL: &str = "https://ows.terrestris.de/osm/service"; // WMS 地址
const LAYER: &str = "OSM-WMS"; // 图层名称
const OUTPUT_FILE: &str = "data/wms.png"; // 输出文件路径

fn main() {
    println!("Example: blockraster wms");

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_thread_ids(true)
        .init();

    // 整个世界,Web 墨卡托
    let extent = 20037508.342789244;
    let grid = PixelGrid::new(Region::new(-extent, -extent, extent, extent), (4096, 4096));
    let endpoint = OgcEndpoint::new(WMS_URL, LAYER)
        .unwrap()
        .with_srs(3857)
        .with_format("image/png");
    let source = HttpTileSource::new(endpoint).with_timeout(Duration::from_secs(30));
    let config = ServiceConfig::default()
        .with_tile_size(256, 256)
        .with_block_size(512, 512);

    let layer = ServiceRasterFile::new(
        WMS_URL,
        grid,
        PixelType::rgba8(),
        5,
        Arc::new(source),
        Arc::new(ImageCodec::new(ImageFormat::Png)),
        config,
    )
    .unwrap();

    // 最粗的层级是 256x256,只需要一个块
    let mut editor = layer.editor(4).unwrap();
    let descriptor = editor.descriptor().clone();
    println!("Reading {descriptor}");

    let t0 = Instant::now();
    let mut block = vec![0u8; descriptor.block_size_bytes()];
    editor.read_block(0, 0, &mut block).unwrap();
    println!(
        "Got block in {:.3}ms",
        t0.elapsed().as_micros() as f64 / 1000.0
    );

    // 再读一次应当命中缓存
    let t1 = Instant::now();
    editor.read_block(0, 0, &mut block).unwrap();
    println!(
        "Got cached block in {:.3}ms ({} tiles cached)",
        t1.elapsed().as_micros() as f64 / 1000.0,
        editor.cached_tiles()
    );

    let width = descriptor.block_width;
    let visible = descriptor.width().min(width as u64) as u32;
    let img = image::RgbaImage::from_fn(visible, descriptor.height() as u32, |x, y| {
        let offset = ((y * width + x) * 4) as usize;
        image::Rgba([block[offset], block[offset + 1], block[offset + 2], block[offset + 3]])
    });
    img.save(OUTPUT_FILE).unwrap();
    println!("Image saved to {OUTPUT_FILE}");
}
