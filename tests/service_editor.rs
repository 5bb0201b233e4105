use blockraster::codec::{Codec, Compression};
use blockraster::factory::{open_adapted, RasterFileFactory};
use blockraster::geometry::{PixelGrid, Region};
use blockraster::indicator::{BlockAccessEvent, BlockAccessIndicator, BlockAccessListener};
use blockraster::raster::PixelType;
use blockraster::resolution::{AccessMode, BlockError, BlockType, ResolutionEditor};
use blockraster::service::{
    FetchError, RequestContext, ServiceConfig, ServiceEditor, ServiceRasterCreator,
    ServiceRasterFile, TileId, TileRequest, TileSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TILE: u32 = 4;

fn pixel(x: u64, y: u64) -> u8 {
    ((x * 3 + y * 5) % 251) as u8
}

#[derive(Clone, Copy, PartialEq)]
enum Behaviour {
    Serve,
    Transient,
    NotAvailable,
    Protocol,
    Garbage,
    /// 第一次获取时 panic,之后正常返回数据
    PanicOnce,
}

/// 按脚本返回数据的瓦片源,可以用闸门阻塞获取
struct FakeSource {
    calls: AtomicUsize,
    requests: Mutex<Vec<TileRequest>>,
    behaviour: Mutex<Behaviour>,
    gate: Mutex<bool>,
    opened: Condvar,
}

impl FakeSource {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            behaviour: Mutex::new(behaviour),
            gate: Mutex::new(true),
            opened: Condvar::new(),
        })
    }

    fn gated() -> Arc<Self> {
        let source = Self::new(Behaviour::Serve);
        *source.gate.lock().unwrap() = false;
        source
    }

    fn open_gate(&self) {
        *self.gate.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }
}

impl TileSource for FakeSource {
    fn fetch(&self, request: &TileRequest) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);

        let behaviour = *self.behaviour.lock().unwrap();
        if behaviour == Behaviour::PanicOnce {
            *self.behaviour.lock().unwrap() = Behaviour::Serve;
            panic!("瓦片源崩溃");
        }
        match behaviour {
            Behaviour::Transient => return Err(FetchError::Transient("timeout".into())),
            Behaviour::NotAvailable => return Err(FetchError::NotAvailable("404".into())),
            Behaviour::Protocol => return Err(FetchError::Protocol("ServiceException".into())),
            Behaviour::Garbage => return Ok(vec![1, 2, 3]),
            Behaviour::Serve | Behaviour::PanicOnce => {}
        }
        let (w, h) = request.dimensions;
        let x0 = request.extent.min_col * TILE as u64;
        let y0 = request.extent.min_row * TILE as u64;
        let raw: Vec<u8> = (0..h as u64)
            .flat_map(|y| (0..w as u64).map(move |x| pixel(x0 + x, y0 + y)))
            .collect();
        Ok(Compression::Deflate
            .compress(&raw, (w, h), &PixelType::gray8())
            .unwrap())
    }
}

fn config() -> ServiceConfig {
    ServiceConfig::default()
        .with_worker_count(2)
        .with_tile_size(TILE, TILE)
        .with_max_tiles_per_block(2, 2)
}

fn open(source: Arc<FakeSource>, dimensions: (u64, u64), config: ServiceConfig) -> ServiceRasterFile {
    ServiceRasterFile::new(
        "wms://test",
        PixelGrid::new(Region::new(0.0, 0.0, 16.0, 8.0), dimensions),
        PixelType::gray8(),
        1,
        source,
        Arc::new(Compression::Deflate),
        config,
    )
    .unwrap()
}

fn expected_block(x0: u64, y0: u64, (w, h): (u64, u64), raster: (u64, u64)) -> Vec<u8> {
    let mut out = Vec::new();
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            out.push(if x < raster.0 && y < raster.1 { pixel(x, y) } else { 0 });
        }
    }
    out
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "等待超时: {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_read_block_and_cache_hit() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16];
    editor.read_block(4, 4, &mut out).unwrap();
    assert_eq!(out, expected_block(4, 4, (4, 4), (16, 8)));
    assert_eq!(source.calls(), 1);

    editor.read_block(4, 4, &mut out).unwrap();
    assert_eq!(source.calls(), 1);
    assert_eq!(editor.cached_tiles(), 1);
}

#[test]
fn test_edge_block_is_zero_padded() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source, (10, 6), config());
    let mut editor = file.editor(0).unwrap();
    let mut out = vec![0xFFu8; 16];
    editor.read_block(8, 4, &mut out).unwrap();
    assert_eq!(out, expected_block(8, 4, (4, 4), (10, 6)));
}

#[test]
fn test_large_block_batches_tiles_into_one_request() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config().with_block_size(16, 8));
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16 * 8];
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(out, expected_block(0, 0, (16, 8), (16, 8)));

    // 4x2 个瓦片按 2x2 分组,需要两次请求
    assert_eq!(source.calls(), 2);
    let requests = source.requests.lock().unwrap();
    assert!(requests.iter().all(|r| r.dimensions == (8, 8)));
    assert!(requests.iter().all(|r| r.extent.tile_count() == 4));
}

#[test]
fn test_concurrent_reads_share_one_query() {
    let source = FakeSource::gated();
    let file = open(source.clone(), (16, 8), config());
    let editor = file.editor(0).unwrap();

    let mut first = editor.clone();
    let a = thread::spawn(move || {
        let mut out = vec![0u8; 16];
        first.read_block(0, 0, &mut out).map(|_| out)
    });
    wait_until("第一次获取开始", || source.calls() == 1);

    let mut second = editor.clone();
    let b = thread::spawn(move || {
        let mut out = vec![0u8; 16];
        second.read_block(0, 0, &mut out).map(|_| out)
    });
    thread::sleep(Duration::from_millis(50));
    source.open_gate();

    let a = a.join().unwrap().unwrap();
    let b = b.join().unwrap().unwrap();
    assert_eq!(a, expected_block(0, 0, (4, 4), (16, 8)));
    assert_eq!(a, b);
    assert_eq!(source.calls(), 1);
}

#[test]
fn test_failed_fetch_uses_placeholder() {
    for behaviour in [Behaviour::Transient, Behaviour::NotAvailable] {
        let source = FakeSource::new(behaviour);
        let placeholder = Compression::Deflate
            .compress(&[0xAA; 16], (TILE, TILE), &PixelType::gray8())
            .unwrap();
        let file = open(source.clone(), (16, 8), config().with_invalid_tile(placeholder));
        let mut editor = file.editor(0).unwrap();

        let mut out = vec![0u8; 16];
        editor.read_block(0, 0, &mut out).unwrap();
        assert_eq!(out, vec![0xAA; 16]);

        // 失败的瓦片也算就绪,不会重复请求
        editor.read_block(0, 0, &mut out).unwrap();
        assert_eq!(source.calls(), 1);
    }
}

#[test]
fn test_panicked_query_is_refetched() {
    let source = FakeSource::new(Behaviour::PanicOnce);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16];
    assert!(matches!(
        editor.read_block(4, 0, &mut out),
        Err(BlockError::TileUnavailable(id)) if id == TileId::new(1, 0, 0)
    ));
    assert_eq!(source.calls(), 1);

    // 异常结束的查询留下的瓦片由下一次读取重新获取
    editor.read_block(4, 0, &mut out).unwrap();
    assert_eq!(out, expected_block(4, 0, (4, 4), (16, 8)));
    assert_eq!(source.calls(), 2);

    editor.read_block(4, 0, &mut out).unwrap();
    assert_eq!(source.calls(), 2);
}

#[test]
fn test_protocol_error_reported_once() {
    let source = FakeSource::new(Behaviour::Protocol);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0x55u8; 16];
    let result = editor.read_block(0, 0, &mut out);
    assert!(matches!(result, Err(BlockError::Protocol(_))));
    assert_eq!(out, vec![0x55; 16]);

    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(out, vec![0; 16]);
    assert_eq!(source.calls(), 1);
}

#[test]
fn test_undecodable_response_is_stored() {
    let source = FakeSource::new(Behaviour::Garbage);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16];
    assert!(matches!(
        editor.read_block(4, 0, &mut out),
        Err(BlockError::Decompress(_))
    ));
    source.set_behaviour(Behaviour::Serve);
    editor.read_block(4, 0, &mut out).unwrap();
    assert_eq!(out, vec![0; 16]);
}

#[test]
fn test_look_ahead_prefetches_tiles() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let ids = editor.tiles_for_block(8, 4).unwrap();
    assert_eq!(ids, vec![TileId::new(2, 1, 0)]);
    assert_eq!(editor.request_look_ahead(&ids).unwrap(), 1);
    // 已经在获取中的瓦片不会再次提交
    assert_eq!(editor.request_look_ahead(&ids).unwrap(), 0);
    wait_until("预取完成", || editor.outstanding_queries() == 0);

    let mut out = vec![0u8; 16];
    editor.read_block(8, 4, &mut out).unwrap();
    assert_eq!(out, expected_block(8, 4, (4, 4), (16, 8)));
    assert_eq!(source.calls(), 1);
}

#[test]
fn test_look_ahead_ignores_invalid_tiles() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config());
    let editor = file.editor(0).unwrap();
    let ids = [TileId::new(9, 0, 0), TileId::new(0, 0, 3)];
    assert_eq!(editor.request_look_ahead(&ids).unwrap(), 0);
    assert_eq!(source.calls(), 0);
}

#[test]
fn test_cancel_look_ahead_allows_refetch() {
    let source = FakeSource::gated();
    let file = open(source.clone(), (16, 8), config().with_worker_count(1));
    let mut editor = file.editor(0).unwrap();

    let running = TileId::new(0, 0, 0);
    let queued = TileId::new(3, 1, 0);
    assert_eq!(editor.request_look_ahead(&[running]).unwrap(), 1);
    wait_until("预取开始", || source.calls() == 1);
    assert_eq!(editor.request_look_ahead(&[queued]).unwrap(), 1);

    assert_eq!(editor.cancel_look_ahead().unwrap(), 2);
    assert_eq!(editor.outstanding_queries(), 0);
    source.open_gate();

    let mut out = vec![0u8; 16];
    editor.read_block(12, 4, &mut out).unwrap();
    assert_eq!(out, expected_block(12, 4, (4, 4), (16, 8)));
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(out, expected_block(0, 0, (4, 4), (16, 8)));
    // 被取消的排队查询从未执行,两个瓦片都重新获取
    assert_eq!(source.calls(), 3);
}

#[test]
fn test_context_changed_evicts_tiles() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16];
    editor.read_block(0, 0, &mut out).unwrap();
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(source.calls(), 1);

    editor
        .context_changed(RequestContext::new().with_param("TIME", "2024"))
        .unwrap();
    assert_eq!(editor.cached_tiles(), 0);
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(source.calls(), 2);

    let requests = source.requests.lock().unwrap();
    assert!(requests[0].context.is_empty());
    assert_eq!(
        requests[1].context.params(),
        &[("TIME".to_string(), "2024".to_string())]
    );
}

#[test]
fn test_file_context_changed_reaches_open_editors() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config());
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16];
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(file.cancel_look_ahead().unwrap(), 0);

    file.context_changed(RequestContext::new().with_param("STYLES", "dark"))
        .unwrap();
    assert_eq!(editor.cached_tiles(), 0);
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(source.calls(), 2);
    assert_eq!(
        source.requests.lock().unwrap()[1].context.params(),
        &[("STYLES".to_string(), "dark".to_string())]
    );
}

#[test]
fn test_cache_evicts_least_recently_used() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source.clone(), (16, 8), config().with_cache_capacity(2));
    let mut editor = file.editor(0).unwrap();

    let mut out = vec![0u8; 16];
    for x in [0, 4, 8] {
        editor.read_block(x, 0, &mut out).unwrap();
    }
    assert_eq!(editor.cached_tiles(), 2);
    editor.read_block(8, 0, &mut out).unwrap();
    assert_eq!(source.calls(), 3);
    editor.read_block(0, 0, &mut out).unwrap();
    assert_eq!(source.calls(), 4);
}

#[test]
fn test_service_is_read_only() {
    let source = FakeSource::new(Behaviour::Serve);
    let file = open(source, (16, 8), config());
    let mut editor: ServiceEditor = file.editor(0).unwrap();
    assert_eq!(editor.access_mode(), AccessMode::READ);
    assert!(matches!(
        editor.write_block(0, 0, &[0; 16]),
        Err(BlockError::AccessDenied(_))
    ));
    assert!(matches!(
        editor.read_block(2, 0, &mut [0; 16]),
        Err(BlockError::Misaligned(_))
    ));
}

#[derive(Default)]
struct ErrorLog(Mutex<Vec<(u64, u64)>>);

impl BlockAccessListener for ErrorLog {
    fn read_block_error(&self, event: &BlockAccessEvent<'_>) {
        self.0.lock().unwrap().push(event.position);
    }
}

#[test]
fn test_indicator_is_notified() {
    let source = FakeSource::new(Behaviour::Protocol);
    let indicator = Arc::new(BlockAccessIndicator::new());
    let log = Arc::new(ErrorLog::default());
    indicator.add_listener(log.clone());

    let file = open(source, (16, 8), config()).with_indicator(indicator);
    let mut editor = file.editor(0).unwrap();
    let _ = editor.read_block(4, 4, &mut [0; 16]);
    assert_eq!(*log.0.lock().unwrap(), vec![(4, 4)]);
}

#[test]
fn test_factory_opens_service_as_image() {
    let source = FakeSource::new(Behaviour::Serve);
    let creator = ServiceRasterCreator::new(
        "wms://",
        PixelGrid::new(Region::new(0.0, 0.0, 8.0, 8.0), (8, 8)),
        PixelType::gray8(),
        source.clone(),
        Arc::new(Compression::Deflate),
    )
    .with_levels(2)
    .with_config(config());

    let mut factory = RasterFileFactory::new();
    factory.register(Arc::new(creator));
    assert!(factory.find_creator_for("file:///a.tif").is_none());
    assert!(factory.open("wms://roads", AccessMode::READ_WRITE).is_err());

    let file = factory.open("wms://roads", AccessMode::READ).unwrap();
    assert_eq!(file.resolutions().len(), 2);
    assert_eq!(file.resolutions()[1].dimensions, (4, 4));

    let mut image = open_adapted(file.as_ref(), 0, BlockType::Image, AccessMode::READ).unwrap();
    let mut out = vec![0u8; 64];
    image.read_block(0, 0, &mut out).unwrap();
    assert_eq!(out, expected_block(0, 0, (8, 8), (8, 8)));
    // 每个原生瓦片块各读取一次
    assert_eq!(source.calls(), 4);
}
