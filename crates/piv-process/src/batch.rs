//! Producer/consumer batch pipeline.
//!
//! N correlator workers pull pair indices from a shared work queue, load
//! both frames, correlate every interrogation window and publish one
//! [`PairResult`] per pair onto a bounded channel (capacity
//! `min(N, 10)`). A single writer thread consumes results and writes one
//! vector file per pair; with [`BatchConfig::ordered`] it buffers
//! out-of-order results and releases them monotonically by pair index.
//!
//! # Error policy
//!
//! A failed load or save is logged and the pair skipped; the batch
//! continues. A correlator failure (an invariant violation inside the
//! numerical core) cancels the batch and is surfaced from
//! [`Batch::stop_and_join`].
//!
//! # Cancellation
//!
//! [`Batch::stop`] sets a shared flag (checked at worker loop tops and
//! between records) and closes a wake-up channel so blocked channel
//! operations return immediately. Shutdown is cooperative: stop, drain,
//! join.

use crate::correlate::{BatchConfig, process_pair};
use crate::error::{ProcessError, ProcessResult};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use piv_algos::Fft;
use piv_core::{GfImage, log_error, log_info};
use piv_io::{LoaderRegistry, VectorRecord, write_vector_field};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// One input pair of frame paths.
#[derive(Debug, Clone)]
pub struct ImagePair {
    /// Frame at time t.
    pub a: PathBuf,
    /// Frame at time t + dt.
    pub b: PathBuf,
}

impl ImagePair {
    /// Output stem: the first frame's file stem.
    pub fn stem(&self) -> String {
        self.a
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pair".to_string())
    }
}

/// The records of one fully correlated pair.
#[derive(Debug, Clone)]
pub struct PairResult {
    /// Index into the batch's pair list.
    pub pair_index: usize,
    /// Output file stem.
    pub stem: String,
    /// One record per interrogation window, in grid order.
    pub records: Vec<VectorRecord>,
}

/// What a worker publishes for each pair it takes: a full result, or a
/// skip marker that lets the ordered writer advance past failed pairs.
enum WriterMessage {
    Result(PairResult),
    Skipped { pair_index: usize },
}

impl WriterMessage {
    fn pair_index(&self) -> usize {
        match self {
            WriterMessage::Result(r) => r.pair_index,
            WriterMessage::Skipped { pair_index } => *pair_index,
        }
    }
}

/// Counts reported after a batch finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// Pairs whose vector file was written.
    pub pairs_done: usize,
    /// Pairs skipped after a load or save failure.
    pub pairs_failed: usize,
}

struct Shared {
    config: BatchConfig,
    pairs: Vec<ImagePair>,
    stop: AtomicBool,
    pairs_failed: AtomicUsize,
    pairs_done: AtomicUsize,
    first_error: Mutex<Option<ProcessError>>,
}

impl Shared {
    fn fail_with(&self, err: ProcessError) {
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// A running batch; created by [`Batch::start`].
pub struct Batch {
    shared: Arc<Shared>,
    stop_tx: Mutex<Option<Sender<()>>>,
    workers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Batch {
    /// Validates the configuration and spawns N correlator workers plus
    /// one writer thread. Returns immediately; use [`join`](Batch::join)
    /// or [`stop_and_join`](Batch::stop_and_join) to finish.
    pub fn start(config: BatchConfig, pairs: Vec<ImagePair>) -> ProcessResult<Batch> {
        if config.threads == 0 {
            return Err(ProcessError::InvalidConfig {
                reason: "thread count must be at least 1".into(),
            });
        }
        if !(0.0..1.0).contains(&config.overlap) {
            return Err(ProcessError::InvalidConfig {
                reason: format!("overlap {} outside [0, 1)", config.overlap),
            });
        }
        // reject bad window sizes before spawning anything
        Fft::new(config.interrogation)?;

        std::fs::create_dir_all(&config.output_dir).map_err(piv_io::IoError::from)?;

        let (work_tx, work_rx) = unbounded::<usize>();
        for index in 0..pairs.len() {
            // pre-filled queue; receivers see disconnect once drained
            let _ = work_tx.send(index);
        }
        drop(work_tx);

        let capacity = config.channel_capacity();
        let (out_tx, out_rx) = bounded::<WriterMessage>(capacity);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let shared = Arc::new(Shared {
            config,
            pairs,
            stop: AtomicBool::new(false),
            pairs_failed: AtomicUsize::new(0),
            pairs_done: AtomicUsize::new(0),
            first_error: Mutex::new(None),
        });

        let pairs_len = shared.pairs.len();
        let threads = shared.config.threads;
        log_info!(
            "starting batch: {} pair(s), {} worker(s), channel capacity {}",
            pairs_len,
            threads,
            capacity
        );

        let mut workers = Vec::with_capacity(shared.config.threads);
        for worker_index in 0..shared.config.threads {
            let shared = Arc::clone(&shared);
            let work_rx = work_rx.clone();
            let out_tx = out_tx.clone();
            let stop_rx = stop_rx.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("piv-correlator-{worker_index}"))
                    .spawn(move || worker_loop(&shared, &work_rx, &out_tx, &stop_rx))
                    .map_err(piv_io::IoError::from)?,
            );
        }
        drop(out_tx);

        let writer = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("piv-writer".into())
                .spawn(move || writer_loop(&shared, &out_rx, &stop_rx))
                .map_err(piv_io::IoError::from)?
        };

        Ok(Batch {
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
            workers,
            writer: Some(writer),
        })
    }

    /// Requests cooperative cancellation: sets the stop flag and wakes
    /// any thread blocked on a channel.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        // dropping the sender disconnects every stop receiver
        self.stop_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }

    /// Waits for the batch to finish naturally and returns its summary,
    /// or the first correlator error.
    pub fn join(mut self) -> ProcessResult<BatchSummary> {
        let mut panicked = false;
        for worker in self.workers.drain(..) {
            panicked |= worker.join().is_err();
        }
        if let Some(writer) = self.writer.take() {
            panicked |= writer.join().is_err();
        }

        let first_error = self
            .shared
            .first_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(err) = first_error {
            return Err(err);
        }
        if panicked {
            return Err(ProcessError::WorkerPanicked);
        }

        Ok(BatchSummary {
            pairs_done: self.shared.pairs_done.load(Ordering::SeqCst),
            pairs_failed: self.shared.pairs_failed.load(Ordering::SeqCst),
        })
    }

    /// [`stop`](Batch::stop) followed by [`join`](Batch::join).
    pub fn stop_and_join(self) -> ProcessResult<BatchSummary> {
        self.stop();
        self.join()
    }

    /// Runs a whole batch to completion on the calling thread.
    pub fn run(config: BatchConfig, pairs: Vec<ImagePair>) -> ProcessResult<BatchSummary> {
        Batch::start(config, pairs)?.join()
    }
}

/// Loads both frames of a pair as double greyscale.
fn load_pair(pair: &ImagePair) -> ProcessResult<(GfImage, GfImage)> {
    let load = |path: &Path| -> ProcessResult<GfImage> {
        let mut file = File::open(path).map_err(piv_io::IoError::from)?;
        let mut loader = LoaderRegistry::global().find_for(&mut file)?;
        Ok(loader.load_gf(&mut file)?)
    };
    Ok((load(&pair.a)?, load(&pair.b)?))
}

fn worker_loop(
    shared: &Shared,
    work_rx: &Receiver<usize>,
    out_tx: &Sender<WriterMessage>,
    stop_rx: &Receiver<()>,
) {
    let fft = match Fft::new(shared.config.interrogation) {
        Ok(fft) => fft,
        Err(err) => {
            shared.fail_with(err.into());
            return;
        }
    };

    // bounded send is the pipeline's backpressure; the stop channel
    // wakes a blocked sender when the batch is cancelled
    let publish = |message: WriterMessage| -> bool {
        select! {
            send(out_tx, message) -> sent => sent.is_ok(),
            recv(stop_rx) -> _ => false,
        }
    };

    while !shared.stop.load(Ordering::SeqCst) {
        let pair_index = match work_rx.recv() {
            Ok(index) => index,
            Err(_) => break, // queue drained
        };
        let pair = &shared.pairs[pair_index];

        let (a, b) = match load_pair(pair) {
            Ok(frames) => frames,
            Err(err) => {
                log_error!("skipping pair {pair_index}: {err}");
                shared.pairs_failed.fetch_add(1, Ordering::SeqCst);
                if !publish(WriterMessage::Skipped { pair_index }) {
                    break;
                }
                continue;
            }
        };

        let should_stop = || shared.stop.load(Ordering::SeqCst);
        let records = match process_pair(&fft, &shared.config, &a, &b, &should_stop) {
            Ok(Some(records)) => records,
            Ok(None) => break, // cancelled mid-pair
            Err(err) => {
                let err_msg = err.to_string();
                log_error!("correlator failed on pair {pair_index}: {err_msg}");
                shared.fail_with(err);
                break;
            }
        };

        let published = publish(WriterMessage::Result(PairResult {
            pair_index,
            stem: pair.stem(),
            records,
        }));
        if !published {
            break;
        }
    }
}

fn writer_loop(shared: &Shared, out_rx: &Receiver<WriterMessage>, stop_rx: &Receiver<()>) {
    // ordered mode: buffer out-of-order results and release monotonically
    let mut pending: BTreeMap<usize, Option<PairResult>> = BTreeMap::new();
    let mut next_index = 0usize;
    let mut cancelled = false;

    loop {
        let message = select! {
            recv(out_rx) -> received => match received {
                Ok(message) => message,
                Err(_) => break, // every producer finished
            },
            recv(stop_rx) -> _ => {
                cancelled = true;
                break;
            }
        };

        if shared.config.ordered {
            let index = message.pair_index();
            let slot = match message {
                WriterMessage::Result(result) => Some(result),
                WriterMessage::Skipped { .. } => None,
            };
            pending.insert(index, slot);

            while let Some(slot) = pending.remove(&next_index) {
                if let Some(result) = slot {
                    write_result(shared, &result);
                }
                next_index += 1;
            }
        } else if let WriterMessage::Result(result) = message {
            write_result(shared, &result);
        }
    }

    if !cancelled {
        // a correlator abort can leave gaps; flush what remains in order
        for slot in pending.values() {
            if let Some(result) = slot {
                write_result(shared, result);
            }
        }
    }
}

fn write_result(shared: &Shared, result: &PairResult) {
    let path = shared
        .config
        .output_dir
        .join(format!("{}.vec", result.stem));

    let written = File::create(&path)
        .map_err(piv_io::IoError::from)
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            write_vector_field(&mut out, &result.records)
        });

    match written {
        Ok(()) => {
            shared.pairs_done.fetch_add(1, Ordering::SeqCst);
            let records_len = result.records.len();
            let pair_index = result.pair_index;
            let path_display = path.display().to_string();
            log_info!(
                "wrote {} record(s) for pair {} to {}",
                records_len,
                pair_index,
                path_display
            );
        }
        Err(err) => {
            shared.pairs_failed.fetch_add(1, Ordering::SeqCst);
            log_error!("failed to write {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piv_core::{G16Image, Gray, Size, util};
    use piv_io::{ImageLoader, PnmLoader, register_default_loaders};

    fn write_frame(dir: &Path, name: &str, offset: u16) -> PathBuf {
        let mut im = G16Image::with_size(Size::new(128, 64));
        util::fill_with(&mut im, |x, y| {
            Gray(((x * 7 + y * 13 + u32::from(offset) * 5) % 251) as u16 * 200)
        });

        let path = dir.join(name);
        let mut out = BufWriter::new(File::create(&path).unwrap());
        PnmLoader::new().save_g16(&mut out, &im).unwrap();
        path
    }

    fn test_config(output_dir: PathBuf, threads: usize, ordered: bool) -> BatchConfig {
        BatchConfig {
            interrogation: Size::new(32, 32),
            overlap: 0.5,
            threads,
            ordered,
            output_dir,
        }
    }

    #[test]
    fn test_batch_writes_one_vector_file_per_pair() {
        register_default_loaders();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let frames: Vec<_> = (0..4)
            .map(|i| write_frame(dir.path(), &format!("frame_{i:03}.pgm"), i))
            .collect();
        let pairs: Vec<_> = frames
            .windows(2)
            .map(|w| ImagePair {
                a: w[0].clone(),
                b: w[1].clone(),
            })
            .collect();

        let summary = Batch::run(test_config(out.clone(), 2, false), pairs).unwrap();
        assert_eq!(summary.pairs_done, 3);
        assert_eq!(summary.pairs_failed, 0);

        for i in 0..3 {
            let text = std::fs::read_to_string(out.join(format!("frame_{i:03}.vec"))).unwrap();
            let lines: Vec<_> = text.lines().collect();
            // header + 7x3 grid records for 128x64 at window 32, overlap 0.5
            assert_eq!(lines.len(), 1 + 21);
            assert_eq!(lines[0], "x\ty\tu\tv\tsnr\tvalid\tfiltered\tintensity");
            assert_eq!(lines[1].split('\t').count(), 8);
        }
    }

    #[test]
    fn test_ordered_batch_completes() {
        register_default_loaders();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("ordered");

        let frames: Vec<_> = (0..5)
            .map(|i| write_frame(dir.path(), &format!("seq_{i:03}.pgm"), i))
            .collect();
        let pairs: Vec<_> = frames
            .windows(2)
            .map(|w| ImagePair {
                a: w[0].clone(),
                b: w[1].clone(),
            })
            .collect();

        let summary = Batch::run(test_config(out.clone(), 3, true), pairs).unwrap();
        assert_eq!(summary.pairs_done, 4);
        for i in 0..4 {
            assert!(out.join(format!("seq_{i:03}.vec")).exists());
        }
    }

    #[test]
    fn test_missing_frame_skips_pair_and_continues() {
        register_default_loaders();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("skips");

        let good_a = write_frame(dir.path(), "good_a.pgm", 0);
        let good_b = write_frame(dir.path(), "good_b.pgm", 1);
        let pairs = vec![
            ImagePair {
                a: dir.path().join("missing.pgm"),
                b: good_a.clone(),
            },
            ImagePair {
                a: good_a,
                b: good_b,
            },
        ];

        let summary = Batch::run(test_config(out.clone(), 2, false), pairs).unwrap();
        assert_eq!(summary.pairs_failed, 1);
        assert_eq!(summary.pairs_done, 1);
        assert!(out.join("good_a.vec").exists());
    }

    #[test]
    fn test_stop_cancels_quickly_and_cleanly() {
        register_default_loaders();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cancelled");

        let a = write_frame(dir.path(), "cancel_a.pgm", 0);
        let b = write_frame(dir.path(), "cancel_b.pgm", 1);
        let pairs: Vec<_> = (0..64)
            .map(|_| ImagePair {
                a: a.clone(),
                b: b.clone(),
            })
            .collect();

        let batch = Batch::start(test_config(out, 1, false), pairs).unwrap();
        batch.stop();
        let summary = batch.stop_and_join().unwrap();
        assert!(summary.pairs_done < 64);
    }

    #[test]
    fn test_invalid_configuration_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = test_config(dir.path().join("x"), 1, false);
        config.interrogation = Size::new(33, 33);
        assert!(Batch::start(config, Vec::new()).is_err());

        let mut config = test_config(dir.path().join("y"), 0, false);
        config.threads = 0;
        assert!(Batch::start(config, Vec::new()).is_err());

        let mut config = test_config(dir.path().join("z"), 1, false);
        config.overlap = 1.0;
        assert!(Batch::start(config, Vec::new()).is_err());
    }

    #[test]
    fn test_empty_batch_finishes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let summary =
            Batch::run(test_config(dir.path().join("empty"), 2, false), Vec::new()).unwrap();
        assert_eq!(summary, BatchSummary::default());
    }
}
