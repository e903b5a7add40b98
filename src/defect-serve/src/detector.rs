use std::sync::Arc;

use log::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::encode::{self, DEFAULT_JPEG_QUALITY};
use crate::engine::{InferenceEngine, Scorer};
use crate::error::{Error, ProcessingError};
use crate::media::MediaType;
use crate::normalize;
use crate::record::{Record, StoredRecord};
use crate::store::RecordStore;
use crate::Timer;

/// Number of records returned by [`Detector::history`].
pub const HISTORY_LIMIT: usize = 50;

/// Classifies uploads and records the outcomes.
///
/// Build one at startup and share it; it holds no per-request state.
pub struct Detector {
    engine: InferenceEngine,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    jpeg_quality: u8,
}

impl Detector {
    pub fn new(scorer: Arc<dyn Scorer>, store: Arc<dyn RecordStore>) -> Self {
        Detector {
            engine: InferenceEngine::new(scorer),
            store,
            clock: Arc::new(SystemClock),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Classify `data` declared as `media_type` and persist the outcome.
    ///
    /// The media type is checked before any byte is decoded. Nothing is
    /// stored unless every step succeeds, and the returned record is exactly
    /// what was appended.
    pub fn predict(&self, data: &[u8], media_type: &str) -> Result<Record, Error> {
        let t = Timer::start("Handling prediction");

        let media_type = MediaType::from_declared(media_type)?;
        debug!("Accepted {} upload of {} bytes", media_type, data.len());

        let normalized = normalize::normalize(data, media_type).map_err(ProcessingError::from)?;

        let verdict = self
            .engine
            .classify(normalized.tensor())
            .map_err(ProcessingError::from)?;
        let timestamp = self.clock.now();

        let image_b64 = encode::encode_jpeg_base64(normalized.image(), self.jpeg_quality)
            .map_err(ProcessingError::Encode)?;

        let record = Record::new(image_b64, verdict, timestamp);

        let p = Timer::start("Persisting record");
        self.store
            .append(&record)
            .map_err(ProcessingError::Persist)?;
        p.stop();

        t.stop();
        info!(
            "Recorded {}: defective: {}, confidence: {:.4}",
            record.id(),
            record.is_defective(),
            record.confidence()
        );

        Ok(record)
    }

    /// The most recent [`HISTORY_LIMIT`] records, newest first.
    pub fn history(&self) -> Result<Vec<Record>, Error> {
        recent_records(self.store.as_ref())
    }
}

/// Read the history window straight from `store`, without a model.
pub fn recent_records(store: &dyn RecordStore) -> Result<Vec<Record>, Error> {
    let t = Timer::start("Fetching history");

    let records = store
        .query_recent(HISTORY_LIMIT)
        .map_err(Error::StoreUnavailable)?
        .into_iter()
        .map(StoredRecord::into_record)
        .collect::<Vec<_>>();

    t.stop();
    debug!("History holds {} records", records.len());

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FnScorer, ScoreError};
    use crate::fixtures;
    use crate::normalize::NormalizedTensor;
    use crate::store::{MemoryStore, StoreError};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    /// Advances one second per reading.
    struct SteppingClock(AtomicI64);

    impl SteppingClock {
        fn new() -> Self {
            SteppingClock(AtomicI64::new(0))
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let step = self.0.fetch_add(1, Ordering::SeqCst);
            Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(step)
        }
    }

    fn detector(p: f32) -> (Detector, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(FnScorer(move |_: &NormalizedTensor| p));
        let detector =
            Detector::new(scorer, store.clone()).with_clock(Arc::new(SteppingClock::new()));
        (detector, store)
    }

    #[test]
    fn opaque_jpeg_yields_a_complete_record() {
        let (detector, store) = detector(0.8);

        let record = detector
            .predict(&fixtures::rgb_jpeg(300, 200), "image/jpeg")
            .unwrap();

        assert!(!record.id().is_empty());
        assert!(record.is_defective());
        assert!(record.confidence() > 0.5 && record.confidence() <= 1.0);

        let bytes = base64::decode(record.image_b64()).unwrap();
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (150, 150));

        let value = serde_json::to_value(&record).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());

        assert_eq!(store.len(), 1);
        assert_eq!(detector.history().unwrap(), vec![record]);
    }

    #[test]
    fn low_probability_is_non_defective() {
        let (detector, _) = detector(0.1);

        let record = detector.predict(&fixtures::rgb_png(40, 40), "image/png").unwrap();
        assert!(!record.is_defective());
        assert!((record.confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn unsupported_media_type_is_rejected_before_decoding() {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(FnScorer(|_: &NormalizedTensor| -> f32 {
            panic!("scorer must not run")
        }));
        let detector = Detector::new(scorer, store.clone());

        // Valid image bytes, but the declared type is not allowed.
        let err = detector
            .predict(&fixtures::rgb_png(8, 8), "image/gif")
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedMediaType(_)));
        assert!(err.is_client_error());
        assert_eq!(
            err.to_string(),
            "Invalid file format. Please upload a JPEG or PNG image."
        );
        assert!(store.is_empty());
    }

    #[test]
    fn corrupted_jpeg_is_a_processing_error_and_persists_nothing() {
        let (detector, store) = detector(0.9);

        let err = detector
            .predict(b"\xff\xd8\xff\xe0 not really a jpeg", "image/jpeg")
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Processing(ProcessingError::Decode(_))
        ));
        assert!(!err.is_client_error());
        assert!(err.to_string().starts_with("Error processing image: "));
        assert!(store.is_empty());
        assert!(detector.history().unwrap().is_empty());
    }

    #[test]
    fn scorer_failure_persists_nothing() {
        struct Broken;

        impl Scorer for Broken {
            fn score(&self, _: &NormalizedTensor) -> Result<f32, ScoreError> {
                Err(ScoreError::EmptyOutput)
            }
        }

        let store = Arc::new(MemoryStore::new());
        let detector = Detector::new(Arc::new(Broken), store.clone());

        let err = detector
            .predict(&fixtures::rgb_jpeg(20, 20), "image/jpg")
            .unwrap_err();

        assert!(matches!(err, Error::Processing(ProcessingError::Score(_))));
        assert!(store.is_empty());
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        fn append(&self, _: &Record) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }

        fn query_recent(&self, _: usize) -> Result<Vec<StoredRecord>, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "store offline",
            )))
        }
    }

    #[test]
    fn store_failures_surface() {
        let scorer = Arc::new(FnScorer(|_: &NormalizedTensor| 0.7));
        let detector = Detector::new(scorer, Arc::new(FailingStore));

        let err = detector
            .predict(&fixtures::rgb_png(10, 10), "image/png")
            .unwrap_err();
        assert!(matches!(err, Error::Processing(ProcessingError::Persist(_))));

        let err = detector.history().unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.to_string().contains("store offline"));
    }

    #[test]
    fn history_returns_the_latest_fifty_newest_first() {
        let (detector, _) = detector(0.3);
        let image = fixtures::rgb_jpeg(16, 16);

        let ids: Vec<String> = (0..51)
            .map(|_| detector.predict(&image, "image/jpeg").unwrap().id().to_owned())
            .collect();

        let history = detector.history().unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);

        let expected: Vec<&str> = ids.iter().rev().take(50).map(String::as_str).collect();
        let got: Vec<&str> = history.iter().map(Record::id).collect();
        assert_eq!(got, expected);

        assert!(history
            .windows(2)
            .all(|w| w[0].timestamp() > w[1].timestamp()));
    }

    #[test]
    fn history_is_stable_without_appends() {
        let (detector, _) = detector(0.6);
        for _ in 0..3 {
            detector.predict(&fixtures::rgb_png(5, 5), "image/png").unwrap();
        }

        assert_eq!(detector.history().unwrap(), detector.history().unwrap());
    }

    #[test]
    fn history_orders_by_timestamp_not_insertion() {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(FnScorer(|_: &NormalizedTensor| 0.6));
        let detector = Detector::new(scorer, store.clone());

        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for (key, offset) in [("t2", 2), ("t3", 3), ("t1", 1)] {
            store
                .insert_raw(StoredRecord {
                    store_id: format!("_{}", key),
                    id: Some(key.to_owned()),
                    image_b64: String::new(),
                    is_defective: true,
                    confidence: 0.6,
                    timestamp: base + Duration::seconds(offset),
                })
                .unwrap();
        }

        let ids: Vec<String> = detector
            .history()
            .unwrap()
            .iter()
            .map(|r| r.id().to_owned())
            .collect();
        assert_eq!(ids, ["t3", "t2", "t1"]);
    }

    #[test]
    fn history_falls_back_to_store_key_and_hides_it() {
        let store = Arc::new(MemoryStore::new());
        let scorer = Arc::new(FnScorer(|_: &NormalizedTensor| 0.6));
        let detector = Detector::new(scorer, store.clone());

        store
            .insert_raw(StoredRecord {
                store_id: "65f0c0ffee".into(),
                id: None,
                image_b64: String::new(),
                is_defective: false,
                confidence: 0.55,
                timestamp: Utc::now(),
            })
            .unwrap();

        let history = detector.history().unwrap();
        assert_eq!(history[0].id(), "65f0c0ffee");

        let value = serde_json::to_value(&history[0]).unwrap();
        assert!(value.get("_id").is_none());
    }

    #[test]
    fn concurrent_predictions_each_persist_once() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let scorer = Arc::new(FnScorer(move |_: &NormalizedTensor| {
            *counter.lock().unwrap() += 1;
            0.9
        }));
        let detector = Arc::new(Detector::new(scorer, store.clone()));
        let image = Arc::new(fixtures::rgb_jpeg(64, 48));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let detector = detector.clone();
                let image = image.clone();
                std::thread::spawn(move || detector.predict(&image, "image/jpeg").unwrap())
            })
            .collect();

        let mut ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().id().to_owned())
            .collect();
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 4);
        assert_eq!(store.len(), 4);
        assert_eq!(*calls.lock().unwrap(), 4);
    }
}
