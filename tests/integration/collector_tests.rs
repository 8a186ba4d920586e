//! End-to-end collection tests.
//!
//! Tests verify:
//! - Decoded tiles match a direct decode of the source bytes
//! - Buffers returned by the consumer are reused by later decodes
//! - Every request yields exactly one tile
//! - Failing layers degrade to empty tiles instead of aborting the run
//! - The pool outlives a run and serves the next one

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tile_collector::buffer::{BufferConfiguration, PixelBufferPool, PixelFormat};
use tile_collector::decode::ImageDecoder;
use tile_collector::source::{FileLayerSource, Layer, MemoryLayerSource};
use tile_collector::tile::{rendezvous, TileCollector, TileCoordinate};
use tile_collector::CollectorError;

use super::test_utils::{
    create_jpeg, create_png, drain, shared, EmptySource, FailingSource, BLUE, RED,
};

// =============================================================================
// Decode and Reuse
// =============================================================================

#[tokio::test]
async fn test_collects_and_reuses_returned_buffers() {
    let jpeg = create_jpeg(256, 256);
    let config = BufferConfiguration::new(PixelFormat::Rgb565, 2).unwrap();
    let expected = ImageDecoder::new()
        .decode_bytes(&jpeg, &config, None)
        .unwrap();

    let collector = TileCollector::new(1, config, 256).unwrap();
    let layers = vec![Layer::new(
        "base",
        shared(MemoryLayerSource::uniform(jpeg)),
    )];
    let pool = Arc::new(PixelBufferPool::new());
    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();

    let run = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move {
            collector
                .collect_tiles(request_rx, result_tx, &layers, pool, CancellationToken::new())
                .await
        }
    });

    let batches = [
        [
            TileCoordinate::new(0, 0, 0),
            TileCoordinate::new(0, 1, 1),
            TileCoordinate::new(0, 2, 1),
        ],
        [
            TileCoordinate::new(1, 0, 0),
            TileCoordinate::new(1, 1, 1),
            TileCoordinate::new(1, 2, 1),
        ],
    ];

    let mut received = Vec::new();
    let mut previous_ptr = None;
    for coord in batches.iter().flatten().copied() {
        request_tx.send_async(coord).await.unwrap();
        let tile = result_rx.recv_async().await.unwrap();
        assert_eq!(tile.coord, coord);
        assert_eq!(tile.downsample, 2);
        assert_eq!(tile.layer_ids.len(), 1);
        assert_eq!(&*tile.layer_ids[0], "base");

        let image = tile.image.unwrap();
        assert_eq!(image, expected);
        assert_eq!((image.width(), image.height()), (128, 128));

        // Zoom 0 buffers go back to the pool and must be picked up again
        let ptr = image.pixels().as_ptr();
        if coord.zoom == 0 {
            if coord.row > 0 {
                assert_eq!(Some(ptr), previous_ptr);
            }
            previous_ptr = Some(ptr);
            assert!(pool.put(image).await);
        } else {
            received.push(image);
        }
    }

    drop(request_tx);
    let summary = run.await.unwrap().unwrap();

    assert_eq!(summary.tiles_emitted, 6);
    assert_eq!(summary.empty_tiles, 0);
    assert_eq!(summary.layer_failures, 0);
    assert!(!summary.cancelled);

    let stats = pool.stats().await;
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.idle_buffers, 0);
    assert_eq!(received.len(), 3);
}

#[tokio::test]
async fn test_every_request_yields_one_tile() {
    let collector = TileCollector::new(
        4,
        BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap(),
        8,
    )
    .unwrap();
    let layers = vec![Layer::new(
        "base",
        shared(MemoryLayerSource::uniform(create_png(8, 8, RED))),
    )];
    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();

    let coords: Vec<_> = (0..5)
        .flat_map(|row| (0..5).map(move |col| TileCoordinate::new(3, row, col)))
        .collect();
    let producer = tokio::spawn({
        let coords = coords.clone();
        async move {
            for coord in coords {
                request_tx.send_async(coord).await.unwrap();
            }
        }
    });
    let consumer = tokio::spawn(drain(result_rx));

    let summary = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::new(PixelBufferPool::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    producer.await.unwrap();
    let tiles = consumer.await.unwrap();

    assert_eq!(summary.tiles_emitted, 25);
    assert_eq!(tiles.len(), 25);
    let seen: HashSet<_> = tiles.iter().map(|tile| tile.coord).collect();
    assert_eq!(seen, coords.into_iter().collect::<HashSet<_>>());
    assert!(tiles.iter().all(|tile| tile.image.is_some()));
}

#[tokio::test]
async fn test_file_layer_source_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let tile_dir = dir.path().join("2").join("1");
    std::fs::create_dir_all(&tile_dir).unwrap();
    std::fs::write(tile_dir.join("3.png"), create_png(16, 16, BLUE)).unwrap();

    let template = format!("{}/{{z}}/{{row}}/{{col}}.png", dir.path().display());
    let layers = vec![Layer::new("disk", shared(FileLayerSource::new(template)))];
    let collector = TileCollector::new(
        2,
        BufferConfiguration::new(PixelFormat::Rgba8888, 4).unwrap(),
        16,
    )
    .unwrap();

    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        request_tx
            .send_async(TileCoordinate::new(2, 1, 3))
            .await
            .unwrap();
        request_tx
            .send_async(TileCoordinate::new(2, 0, 0))
            .await
            .unwrap();
    });
    let consumer = tokio::spawn(drain(result_rx));

    let summary = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::new(PixelBufferPool::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let tiles = consumer.await.unwrap();

    assert_eq!(summary.tiles_emitted, 2);
    assert_eq!(summary.empty_tiles, 1);
    assert_eq!(summary.layer_failures, 1);

    let found = tiles
        .iter()
        .find(|tile| tile.coord == TileCoordinate::new(2, 1, 3))
        .unwrap();
    let image = found.image.as_ref().unwrap();
    assert_eq!((image.width(), image.height()), (4, 4));
    assert_eq!(image.pixel(0, 0), BLUE);

    let missing = tiles
        .iter()
        .find(|tile| tile.coord == TileCoordinate::new(2, 0, 0))
        .unwrap();
    assert!(missing.is_empty());
}

// =============================================================================
// Layer Failures
// =============================================================================

#[tokio::test]
async fn test_all_layers_failing_yields_one_empty_tile() {
    let failing = Arc::new(FailingSource::new());
    let layers = vec![
        Layer::new("offline", failing.clone()),
        Layer::new("corrupt", shared(EmptySource)),
    ];
    let collector = TileCollector::new(
        2,
        BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap(),
        8,
    )
    .unwrap();

    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        request_tx
            .send_async(TileCoordinate::new(0, 0, 0))
            .await
            .unwrap();
    });
    let consumer = tokio::spawn(drain(result_rx));

    let summary = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::new(PixelBufferPool::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let tiles = consumer.await.unwrap();

    assert_eq!(tiles.len(), 1);
    assert!(tiles[0].is_empty());
    assert!(tiles[0].layer_ids.is_empty());
    assert_eq!(summary.layer_failures, 2);
    assert_eq!(summary.empty_tiles, 1);
    assert_eq!(failing.attempts(), 1);
}

#[tokio::test]
async fn test_failing_layer_is_skipped() {
    let layers = vec![
        Layer::new("offline", shared(FailingSource::new())),
        Layer::new(
            "base",
            shared(MemoryLayerSource::uniform(create_png(8, 8, RED))),
        ),
    ];
    let collector = TileCollector::new(
        1,
        BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap(),
        8,
    )
    .unwrap();

    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        request_tx
            .send_async(TileCoordinate::new(1, 0, 1))
            .await
            .unwrap();
    });
    let consumer = tokio::spawn(drain(result_rx));

    let summary = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::new(PixelBufferPool::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let tiles = consumer.await.unwrap();

    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0].image.as_ref().unwrap().pixel(4, 4), RED);
    assert_eq!(
        tiles[0].layer_ids.iter().map(|id| &**id).collect::<Vec<_>>(),
        vec!["base"]
    );
    assert_eq!(summary.layer_failures, 1);
    assert_eq!(summary.empty_tiles, 0);
}

#[tokio::test]
async fn test_failed_decode_returns_buffer_to_pool() {
    let config = BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap();
    let collector = TileCollector::new(1, config, 8).unwrap();
    let layers = vec![Layer::new("corrupt", shared(EmptySource))];

    let pool = Arc::new(PixelBufferPool::new());
    let idle = tile_collector::PixelBuffer::allocate(8, 8, PixelFormat::Rgba8888);
    assert_eq!(idle.bucket(), collector.bucket());
    pool.put(idle).await;

    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        request_tx
            .send_async(TileCoordinate::new(0, 0, 0))
            .await
            .unwrap();
    });
    let consumer = tokio::spawn(drain(result_rx));

    collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::clone(&pool),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let tiles = consumer.await.unwrap();

    assert!(tiles[0].is_empty());
    let stats = pool.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.idle_buffers, 1);
}

#[tokio::test]
async fn test_zero_layers_yield_empty_tiles() {
    let collector = TileCollector::new(
        2,
        BufferConfiguration::new(PixelFormat::Luma8, 1).unwrap(),
        256,
    )
    .unwrap();
    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        for col in 0..3 {
            request_tx
                .send_async(TileCoordinate::new(5, 0, col))
                .await
                .unwrap();
        }
    });
    let consumer = tokio::spawn(drain(result_rx));

    let summary = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &[],
            Arc::new(PixelBufferPool::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let tiles = consumer.await.unwrap();

    assert_eq!(tiles.len(), 3);
    assert!(tiles.iter().all(|tile| tile.is_empty()));
    assert_eq!(summary.empty_tiles, 3);
    assert_eq!(summary.layer_failures, 0);
}

#[tokio::test]
async fn test_duplicate_layer_id_is_rejected() {
    let collector = TileCollector::new(
        1,
        BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap(),
        256,
    )
    .unwrap();
    let layers = vec![
        Layer::new("roads", shared(EmptySource)),
        Layer::new("labels", shared(EmptySource)),
        Layer::new("roads", shared(EmptySource)),
    ];
    let (_request_tx, request_rx) = rendezvous();
    let (result_tx, _result_rx) = rendezvous();

    let err = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::new(PixelBufferPool::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CollectorError::DuplicateLayer(ref id) if id == "roads"));
}

// =============================================================================
// Pool Across Runs
// =============================================================================

#[tokio::test]
async fn test_pool_outlives_run_and_is_reused_by_next_run() {
    let collector = TileCollector::new(
        1,
        BufferConfiguration::new(PixelFormat::Rgba8888, 1).unwrap(),
        8,
    )
    .unwrap();
    let layers = vec![Layer::new(
        "base",
        shared(MemoryLayerSource::uniform(create_png(8, 8, BLUE))),
    )];
    let pool = Arc::new(PixelBufferPool::new());

    // First run, ended by closing the request channel
    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        request_tx
            .send_async(TileCoordinate::new(0, 0, 0))
            .await
            .unwrap();
    });
    let consumer = tokio::spawn(drain(result_rx));
    let first = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::clone(&pool),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(first.tiles_emitted, 1);

    let image = consumer.await.unwrap().remove(0).image.unwrap();
    let ptr = image.pixels().as_ptr();

    // The collector has stopped; the pool still takes the buffer back
    assert!(pool.put(image).await);
    assert_eq!(pool.len().await, 1);

    // Second run on the same pool picks the returned allocation up
    let (request_tx, request_rx) = rendezvous();
    let (result_tx, result_rx) = rendezvous();
    tokio::spawn(async move {
        request_tx
            .send_async(TileCoordinate::new(0, 0, 1))
            .await
            .unwrap();
    });
    let consumer = tokio::spawn(drain(result_rx));
    let second = collector
        .collect_tiles(
            request_rx,
            result_tx,
            &layers,
            Arc::clone(&pool),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(second.tiles_emitted, 1);

    let tiles = consumer.await.unwrap();
    let image = tiles[0].image.as_ref().unwrap();
    assert_eq!(image.pixels().as_ptr(), ptr);
    assert_eq!(image.pixel(0, 0), BLUE);

    let stats = pool.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!(pool.is_empty().await);
}
