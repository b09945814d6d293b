use std::fs;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use lake::{walk, CachePool, Container, File, FsPool, LakeError, Pool, ReadSeek};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// An in-memory source that counts how often each file is opened, and can be
/// told to fail on one index.
struct MemoryPool {
    container: Arc<Container>,
    data:      Vec<Vec<u8>>,
    opens:     Arc<Vec<AtomicUsize>>,
    fail_on:   Option<usize>,
    current:   Option<Cursor<Vec<u8>>>,
}

impl MemoryPool {
    fn new(data: Vec<Vec<u8>>) -> Self {
        let container = Arc::new(Container {
            files: data
                .iter()
                .enumerate()
                .map(|(i, d)| File { path: format!("file_{i}"), mode: 0o644, size: d.len() as u64 })
                .collect(),
            ..Container::default()
        });
        let opens = Arc::new(data.iter().map(|_| AtomicUsize::new(0)).collect());

        Self { container, data, opens, fail_on: None, current: None }
    }
}

impl Pool for MemoryPool {
    fn size(&self, index: usize) -> u64 {
        self.data[index].len() as u64
    }

    fn seekable_reader(&mut self, index: usize) -> Result<&mut dyn ReadSeek, LakeError> {
        if self.fail_on == Some(index) {
            return Err(LakeError::NotFound(format!("file_{index}").into()));
        }
        self.opens[index].fetch_add(1, Ordering::SeqCst);
        self.current = Some(Cursor::new(self.data[index].clone()));

        match self.current.as_mut() {
            Some(cursor) => Ok(cursor),
            None => Err(LakeError::Closed),
        }
    }

    fn close(&mut self) -> Result<(), LakeError> {
        self.current = None;
        Ok(())
    }
}

fn sample_data() -> Vec<Vec<u8>> {
    vec![b"alpha".to_vec(), vec![0x42; 64 * 1024], Vec::new(), b"omega".to_vec()]
}

/// A cache pool over `source`, storing into a fresh temp directory.
fn cache_over(source: MemoryPool) -> (tempfile::TempDir, CachePool) {
    let dir = tempfile::tempdir().unwrap();
    let container = Arc::clone(&source.container);
    let cache = FsPool::new(Arc::clone(&container), dir.path());
    let pool = CachePool::new(container, Box::new(source), Box::new(cache));
    (dir, pool)
}

fn read_shared(pool: &CachePool, index: usize) -> Result<Vec<u8>, LakeError> {
    let mut contents = Vec::new();
    pool.open_shared(index)?.read_to_end(&mut contents).unwrap();
    Ok(contents)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn close_leaves_cache_pool_usable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.txt"), b"Hello!").unwrap();
    let container = Arc::new(walk().dir(dir.path()).unwrap());

    let cache_dir = tempfile::tempdir().unwrap();
    let source = FsPool::new(Arc::clone(&container), dir.path());
    let cache = FsPool::new(Arc::clone(&container), cache_dir.path());
    let mut pool = CachePool::new(Arc::clone(&container), Box::new(source), Box::new(cache));

    thread::scope(|s| {
        s.spawn(|| {
            for index in 0..container.files.len() {
                let _ = pool.preload(index);
            }
        });
        assert_eq!(read_shared(&pool, 0).unwrap(), b"Hello!");
    });

    for _ in 0..2 {
        let mut contents = Vec::new();
        pool.reader(0).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"Hello!");
        pool.close().unwrap();
    }
    assert_eq!(fs::read(cache_dir.path().join("hello.txt")).unwrap(), b"Hello!");
}

#[test]
fn preload_copies_every_file_once() {
    let source = MemoryPool::new(sample_data());
    let opens = Arc::clone(&source.opens);
    let (_dir, pool) = cache_over(source);

    for index in 0..4 {
        pool.preload(index).unwrap();
        pool.preload(index).unwrap();
    }

    for (index, expected) in sample_data().iter().enumerate() {
        assert_eq!(&read_shared(&pool, index).unwrap(), expected);
        assert_eq!(opens[index].load(Ordering::SeqCst), 1, "file {index} copied more than once");
    }
}

#[test]
fn concurrent_preloads_share_one_copy() {
    const THREADS: usize = 8;

    let source = MemoryPool::new(sample_data());
    let opens = Arc::clone(&source.opens);
    let (_dir, pool) = cache_over(source);
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                pool.preload(1).unwrap();
                assert_eq!(read_shared(&pool, 1).unwrap().len(), 64 * 1024);
            });
        }
    });

    assert_eq!(opens[1].load(Ordering::SeqCst), 1);
}

#[test]
fn readers_wait_for_preload() {
    let source = MemoryPool::new(sample_data());
    let (_dir, pool) = cache_over(source);

    thread::scope(|s| {
        let readers: Vec<_> = (0..4)
            .map(|index| {
                let pool = &pool;
                s.spawn(move || read_shared(pool, index).unwrap())
            })
            .collect();

        for index in (0..4).rev() {
            pool.preload(index).unwrap();
        }

        for (index, reader) in readers.into_iter().enumerate() {
            assert_eq!(reader.join().unwrap(), sample_data()[index]);
        }
    });
}

#[test]
fn failed_preload_shuts_everything_down() {
    let mut source = MemoryPool::new(sample_data());
    source.fail_on = Some(2);
    let (_dir, pool) = cache_over(source);

    pool.preload(0).unwrap();

    thread::scope(|s| {
        let waiter = s.spawn(|| read_shared(&pool, 3));

        let err = pool.preload(2).unwrap_err();
        assert!(matches!(err, LakeError::Materialize { index: 2, .. }), "got {err:?}");
        assert!(matches!(err.root_cause(), LakeError::NotFound(_)));

        let err = waiter.join().unwrap().unwrap_err();
        assert!(err.is_shutdown(), "got {err:?}");
        assert!(matches!(err.root_cause(), LakeError::NotFound(_)));
    });

    // A gate that was already set still reports success without I/O.
    pool.preload(0).unwrap();

    // Everything else fails the same way.
    for index in 1..4 {
        let err = pool.preload(index).unwrap_err();
        assert!(err.is_shutdown(), "preload {index} gave {err:?}");
        assert!(matches!(err.root_cause(), LakeError::NotFound(_)));
    }
    for index in 0..4 {
        let err = read_shared(&pool, index).unwrap_err();
        assert!(err.is_shutdown(), "read {index} gave {err:?}");
    }
}

#[test]
fn failed_preload_releases_pending_seekable_readers() {
    let mut source = MemoryPool::new(sample_data());
    source.fail_on = Some(1);
    let (_dir, mut pool) = cache_over(source);

    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let mut reader = pool.open_shared(3)?;
            reader.seek(SeekFrom::Start(1)).unwrap();
            Ok::<_, LakeError>(())
        });

        assert!(pool.preload(1).is_err());

        let err = waiter.join().unwrap().unwrap_err();
        assert!(err.is_shutdown(), "got {err:?}");
        assert!(matches!(err.root_cause(), LakeError::NotFound(_)));
    });

    let err = pool.seekable_reader(3).err().unwrap();
    assert!(err.is_shutdown(), "got {err:?}");
    assert!(matches!(err.root_cause(), LakeError::NotFound(_)));
}

#[test]
fn seekable_reader_seeks_within_cached_file() {
    let source = MemoryPool::new(sample_data());
    let opens = Arc::clone(&source.opens);
    let (_dir, mut pool) = cache_over(source);

    pool.preload(3).unwrap();
    pool.preload(3).unwrap();

    let reader = pool.seekable_reader(3).unwrap();
    assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 2);
    let mut tail = String::new();
    reader.read_to_string(&mut tail).unwrap();
    assert_eq!(tail, "ega");

    reader.seek(SeekFrom::Start(0)).unwrap();
    let mut all = String::new();
    pool.seekable_reader(3).unwrap().read_to_string(&mut all).unwrap();
    assert_eq!(all, "omega");

    assert_eq!(opens[3].load(Ordering::SeqCst), 1);
}

#[test]
fn shared_readers_interleave_and_seek_independently() {
    let source = MemoryPool::new(sample_data());
    let (_dir, pool) = cache_over(source);
    pool.preload(0).unwrap();
    pool.preload(3).unwrap();

    let mut alpha = pool.open_shared(0).unwrap();
    let mut omega = pool.open_shared(3).unwrap();
    let mut byte = [0; 1];

    alpha.read_exact(&mut byte).unwrap();
    assert_eq!(&byte, b"a");
    omega.read_exact(&mut byte).unwrap();
    assert_eq!(&byte, b"o");

    assert_eq!(alpha.seek(SeekFrom::End(-2)).unwrap(), 3);
    assert_eq!(omega.seek(SeekFrom::Current(1)).unwrap(), 2);

    let mut rest = String::new();
    omega.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "ega");
    rest.clear();
    alpha.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "ha");
}

#[test]
fn held_reader_does_not_block_other_preloads() {
    let source = MemoryPool::new(sample_data());
    let (_dir, pool) = cache_over(source);
    pool.preload(0).unwrap();

    let mut first = pool.open_shared(0).unwrap();
    let mut head = [0; 2];
    first.read_exact(&mut head).unwrap();

    thread::scope(|s| {
        s.spawn(|| pool.preload(1).unwrap());
        assert_eq!(read_shared(&pool, 1).unwrap(), sample_data()[1]);
    });

    let mut rest = Vec::new();
    first.read_to_end(&mut rest).unwrap();
    assert_eq!(&head, b"al");
    assert_eq!(rest, b"pha");
}

#[test]
fn close_releases_waiters_on_unmaterialized_files() {
    let source = MemoryPool::new(sample_data());
    let (_dir, mut pool) = cache_over(source);

    pool.preload(0).unwrap();
    pool.close().unwrap();

    let mut contents = Vec::new();
    pool.reader(0).unwrap().read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"alpha");

    let err = pool.reader(1).err().unwrap();
    assert!(err.is_shutdown(), "got {err:?}");
    assert!(matches!(err.root_cause(), LakeError::Closed));

    let err = pool.preload(1).unwrap_err();
    assert!(err.is_shutdown(), "got {err:?}");
}

#[test]
fn sizes_come_from_the_container() {
    let source = MemoryPool::new(sample_data());
    let (_dir, pool) = cache_over(source);

    assert_eq!(pool.size(1), 64 * 1024);
    assert_eq!(pool.size(2), 0);
}

#[test]
fn out_of_range_index_is_rejected() {
    let source = MemoryPool::new(sample_data());
    let (_dir, pool) = cache_over(source);

    assert!(matches!(pool.preload(9), Err(LakeError::IndexOutOfRange { index: 9, .. })));
    assert!(matches!(pool.open_shared(9).err(), Some(LakeError::IndexOutOfRange { .. })));

    // A bad index does not poison the pool.
    pool.preload(0).unwrap();
}
