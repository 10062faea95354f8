//! Scoring coordinator that runs a policy over every dump file
//!
//! Each dump file is one blocking job. At most `processes` jobs run at once;
//! they stream their rows back over a bounded channel and the coordinator,
//! the only writer, turns them into output rows.

use super::calendar::{ScoreAt, START_YEAR};
use super::progress::{RunStats, ScoreProgress};
use super::resume::Watermarks;
use super::strategy::{SamplingPolicy, ScoredRevision, ScoringContext};
use super::weights::ClassWeights;
use crate::config::{ConfigError, ScoringConfig};
use crate::dump::{DumpError, DumpReader};
use crate::model::QualityModel;
use crate::output::{OutputError, OutputRow, OutputSchema, TsvWriter};
use crate::types::Timestamp;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Rows buffered between the workers and the writer
const CHANNEL_CAPACITY: usize = 1024;

/// Errors that end a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to read dump '{}': {source}", path.display())]
    Dump {
        path: PathBuf,
        #[source]
        source: DumpError,
    },

    #[error("Failed to write scores: {0}")]
    Output(#[from] OutputError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

enum WorkerEvent {
    Row(ScoredRevision),
    Finished { path: PathBuf, pages: usize },
    Failed { path: PathBuf, error: DumpError },
}

/// Scoring coordinator for a batch of dump files
pub struct ScoringCoordinator {
    context: Arc<ScoringContext>,
    policy: Arc<SamplingPolicy>,
    weights: ClassWeights,
    schema: OutputSchema,
    processes: usize,
    verbose: bool,
}

impl ScoringCoordinator {
    /// Output columns for this run
    pub fn schema(&self) -> OutputSchema {
        self.schema
    }

    /// Wrap `out` in a writer with this run's schema, emitting the header
    pub fn writer<W: Write>(&self, out: W) -> Result<TsvWriter<W>, OutputError> {
        TsvWriter::new(out, self.schema)
    }

    /// Score every dump file and write the rows to `sink`
    pub async fn run<W: Write>(&self, dump_paths: &[PathBuf], sink: &mut TsvWriter<W>) -> Result<RunStats, RunError> {
        info!(
            "Scoring {} dump file(s) with {} worker(s)",
            dump_paths.len(),
            self.processes
        );
        let progress = ScoreProgress::new(self.verbose);

        if let Err(e) = self.dispatch(dump_paths, sink, &progress).await {
            progress.abandon();
            return Err(e);
        }
        sink.flush()?;
        progress.finish();

        let stats = progress.get_stats();
        info!(
            "Scoring complete: {} rows written, {} dropped on errors, {} pages in {} file(s), {:.1}s ({:.1} rows/s)",
            stats.rows_written,
            stats.rows_errored,
            stats.pages_processed,
            stats.files_processed,
            stats.elapsed_seconds,
            stats.rows_per_second
        );
        Ok(stats)
    }

    async fn dispatch<W: Write>(
        &self,
        dump_paths: &[PathBuf],
        sink: &mut TsvWriter<W>,
        progress: &ScoreProgress,
    ) -> Result<(), RunError> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let permits = Arc::new(Semaphore::new(self.processes));
        let mut workers = JoinSet::new();

        for path in dump_paths {
            let path = path.clone();
            let (tx, permits) = (tx.clone(), Arc::clone(&permits));
            let (context, policy) = (Arc::clone(&self.context), Arc::clone(&self.policy));

            workers.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| RunError::Worker(e.to_string()))?;
                tokio::task::spawn_blocking(move || score_dump(path, &context, &policy, &tx))
                    .await
                    .map_err(|e| RunError::Worker(e.to_string()))
            });
        }
        drop(tx);

        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Row(scored) => self.write_row(&scored, sink, progress)?,
                WorkerEvent::Finished { path, pages } => {
                    info!("Finished {} ({} pages)", path.display(), pages);
                    progress.file_finished(pages);
                }
                WorkerEvent::Failed { path, error } => {
                    workers.abort_all();
                    return Err(RunError::Dump { path, source: error });
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| RunError::Worker(e.to_string()))??;
        }
        Ok(())
    }

    fn write_row<W: Write>(
        &self,
        scored: &ScoredRevision,
        sink: &mut TsvWriter<W>,
        progress: &ScoreProgress,
    ) -> Result<(), RunError> {
        match &*scored.outcome {
            Ok(score) => {
                let row = OutputRow {
                    page_id: scored.page_id,
                    title: &scored.title,
                    rev_id: scored.rev_id,
                    timestamp: scored.timestamp,
                    score,
                    weighted_sum: self.weights.weighted_sum(score),
                };
                sink.write_row(&row)?;
                progress.row_written(&scored.title, &score.prediction);
            }
            Err(e) => {
                error!(
                    "Error while processing {}({}) @ {}: {}",
                    scored.title, scored.page_id, scored.rev_id, e
                );
                progress.row_errored();
            }
        }
        Ok(())
    }
}

/// Blocking job for one dump file. Reports completion or failure last.
fn score_dump(path: PathBuf, context: &ScoringContext, policy: &SamplingPolicy, tx: &mpsc::Sender<WorkerEvent>) {
    let event = match read_dump(&path, context, policy, tx) {
        Ok(Some(pages)) => WorkerEvent::Finished { path, pages },
        Ok(None) => return,
        Err(error) => WorkerEvent::Failed { path, error },
    };
    // A closed channel means the run is already over
    let _ = tx.blocking_send(event);
}

/// Pages read, or `None` if the coordinator stopped listening
fn read_dump(
    path: &Path,
    context: &ScoringContext,
    policy: &SamplingPolicy,
    tx: &mpsc::Sender<WorkerEvent>,
) -> Result<Option<usize>, DumpError> {
    let mut reader = DumpReader::open(path)?;
    debug!("Reading {}", reader.source_name());

    let mut pages = 0;
    while let Some(page) = reader.next_page()? {
        if tx.is_closed() {
            debug!("Output closed, abandoning {}", path.display());
            return Ok(None);
        }
        pages += 1;
        let (header, revisions) = page.into_parts();
        for row in policy.sample(context, header, revisions) {
            if tx.blocking_send(WorkerEvent::Row(row?)).is_err() {
                debug!("Output closed, abandoning {}", path.display());
                return Ok(None);
            }
        }
    }

    Ok(Some(pages))
}

/// Builder for ScoringCoordinator
pub struct ScoringCoordinatorBuilder {
    model: Arc<dyn QualityModel>,
    sunset: Timestamp,
    score_at: ScoreAt,
    start_year: i32,
    watermarks: Watermarks,
    weights: ClassWeights,
    output_features: bool,
    processes: usize,
    verbose: bool,
}

impl ScoringCoordinatorBuilder {
    /// Start from a model and the sunset; defaults to the latest policy
    pub fn new(model: Arc<dyn QualityModel>, sunset: Timestamp) -> Self {
        Self {
            model,
            sunset,
            score_at: ScoreAt::Latest,
            start_year: START_YEAR,
            watermarks: Watermarks::new(),
            weights: ClassWeights::default(),
            output_features: false,
            processes: ScoringConfig::default_processes(),
            verbose: false,
        }
    }

    pub fn with_score_at(mut self, score_at: ScoreAt) -> Self {
        self.score_at = score_at;
        self
    }

    pub fn with_start_year(mut self, start_year: i32) -> Self {
        self.start_year = start_year;
        self
    }

    /// Skip anything already present in a prior output
    pub fn with_watermarks(mut self, watermarks: Watermarks) -> Self {
        self.watermarks = watermarks;
        self
    }

    pub fn with_class_weights(mut self, weights: ClassWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_output_features(mut self, output_features: bool) -> Self {
        self.output_features = output_features;
        self
    }

    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate the settings and freeze them for the run
    pub fn build(self) -> Result<ScoringCoordinator, ConfigError> {
        if self.processes == 0 {
            return Err(ConfigError::InvalidProcesses);
        }
        self.weights.check_labels(self.model.labels())?;

        let policy = SamplingPolicy::with_start_year(self.score_at, self.sunset, self.start_year);
        let schema = OutputSchema::new(self.model.kind(), self.output_features);

        info!(
            "Model {} ({:?}), scoring at {} up to {}",
            self.model.name(),
            self.model.kind(),
            self.score_at,
            self.sunset
        );
        if let SamplingPolicy::Thresholds(thresholds) = &policy {
            info!("{} calendar thresholds from {}", thresholds.len(), self.start_year);
        }
        if !self.watermarks.is_empty() {
            info!("Resuming past {} previously scored pages", self.watermarks.len());
        }

        let context = ScoringContext::new(self.model, self.sunset)
            .with_watermarks(self.watermarks)
            .with_features(self.output_features);

        Ok(ScoringCoordinator {
            context: Arc::new(context),
            policy: Arc::new(policy),
            weights: self.weights,
            schema,
            processes: self.processes,
            verbose: self.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use crate::scoring::testing::{CountingModel, FailingModel};
    use std::fmt::Write as _;

    /// (rev_id, timestamp, text)
    type Rev<'a> = (u64, &'a str, &'a str);

    fn page_xml(id: u64, title: &str, ns: i32, revisions: &[Rev<'_>]) -> String {
        let mut xml = format!("  <page>\n    <title>{}</title>\n    <ns>{}</ns>\n    <id>{}</id>\n", title, ns, id);
        for (rev_id, timestamp, text) in revisions {
            write!(
                xml,
                "    <revision>\n      <id>{}</id>\n      <timestamp>{}</timestamp>\n      <text>{}</text>\n    </revision>\n",
                rev_id, timestamp, text
            )
            .unwrap();
        }
        xml.push_str("  </page>\n");
        xml
    }

    fn write_dump(dir: &Path, name: &str, pages: &[String]) -> PathBuf {
        let path = dir.join(name);
        let xml = format!("<mediawiki>\n{}</mediawiki>\n", pages.concat());
        std::fs::write(&path, xml).unwrap();
        path
    }

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn output(sink: TsvWriter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(sink.into_inner())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_latest_across_files() {
        let tmp = tempfile::tempdir().unwrap();
        let first = write_dump(
            tmp.path(),
            "a.xml",
            &[
                page_xml(1, "One", 0, &[(10, "2010-01-01T00:00:00Z", "short"), (11, "2012-01-01T00:00:00Z", "much longer text")]),
                page_xml(2, "Talk:One", 1, &[(20, "2010-01-01T00:00:00Z", "talk")]),
            ],
        );
        let second = write_dump(
            tmp.path(),
            "b.xml",
            &[page_xml(3, "Three", 0, &[(30, "2011-05-05T00:00:00Z", "tiny")])],
        );

        let model = Arc::new(CountingModel::new(ModelKind::ProbabilityClassifier));
        let coordinator = ScoringCoordinatorBuilder::new(model.clone(), ts("2016-01-01"))
            .with_processes(2)
            .build()
            .unwrap();

        let mut sink = coordinator.writer(Vec::new()).unwrap();
        let stats = coordinator.run(&[first, second], &mut sink).await.unwrap();
        assert_eq!(stats.rows_written, 2);
        assert_eq!(stats.rows_errored, 0);
        assert_eq!(stats.pages_processed, 3);
        assert_eq!(stats.files_processed, 2);
        assert_eq!(model.calls(), 2);

        let lines = output(sink);
        assert_eq!(lines[0], "page_id\ttitle\trev_id\ttimestamp\tprediction\tprobability\tweighted_sum");
        let mut rows = lines[1..].to_vec();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                "1\tOne\t11\t20160101000000\tFA\t{\"FA\":0.8,\"Stub\":0.2}\t4.0".to_string(),
                "3\tThree\t30\t20160101000000\tStub\t{\"FA\":0.2,\"Stub\":0.8}\t1.0".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_scoring_errors_drop_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = write_dump(
            tmp.path(),
            "dump.xml",
            &[page_xml(
                1,
                "Page",
                0,
                &[
                    (10, "2010-01-01T00:00:00Z", "tiny"),
                    (11, "2011-01-01T00:00:00Z", "long enough to score"),
                    (12, "2012-01-01T00:00:00Z", "tiny"),
                ],
            )],
        );

        let model = Arc::new(FailingModel::below(ModelKind::Classifier, 10.0));
        let coordinator = ScoringCoordinatorBuilder::new(model, ts("2016-01-01"))
            .with_score_at(ScoreAt::Revision)
            .with_processes(1)
            .build()
            .unwrap();

        let mut sink = coordinator.writer(Vec::new()).unwrap();
        let stats = coordinator.run(&[dump], &mut sink).await.unwrap();
        assert_eq!(stats.rows_written, 1);
        assert_eq!(stats.rows_errored, 2);

        let lines = output(sink);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1\tPage\t11\t20110101000000\tFA\t5.0");
    }

    #[tokio::test]
    async fn test_missing_dump_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.xml");

        let model = Arc::new(CountingModel::new(ModelKind::Classifier));
        let coordinator = ScoringCoordinatorBuilder::new(model, ts("2016-01-01"))
            .with_processes(1)
            .build()
            .unwrap();

        let mut sink = coordinator.writer(Vec::new()).unwrap();
        let err = coordinator.run(&[missing.clone()], &mut sink).await.unwrap_err();
        match err {
            RunError::Dump { path, source } => {
                assert_eq!(path, missing);
                assert!(matches!(source, DumpError::Io(_)));
            }
            other => panic!("expected a dump error, got {:?}", other),
        }
    }

    #[test]
    fn test_reading_stops_once_output_closes() {
        let tmp = tempfile::tempdir().unwrap();
        let pages: Vec<String> = (1..=3)
            .map(|id| page_xml(id, &format!("Page {}", id), 0, &[(id * 10, "2010-01-01T00:00:00Z", "text")]))
            .collect();
        let dump = write_dump(tmp.path(), "done.xml", &pages);

        // Every page was already scored at the sunset, so nothing is ever sent
        let sunset = ts("2016-01-01");
        let watermarks: Watermarks = (1..=3).map(|id| (id, sunset)).collect();
        let context = ScoringContext::new(Arc::new(CountingModel::new(ModelKind::Classifier)), sunset)
            .with_watermarks(watermarks);

        let (tx, rx) = mpsc::channel(1);
        assert_eq!(read_dump(&dump, &context, &SamplingPolicy::Latest, &tx).unwrap(), Some(3));

        drop(rx);
        assert_eq!(read_dump(&dump, &context, &SamplingPolicy::Latest, &tx).unwrap(), None);
    }

    #[tokio::test]
    async fn test_monthly_with_features() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = write_dump(
            tmp.path(),
            "dump.xml",
            &[page_xml(
                5,
                "Monthly",
                0,
                &[(50, "2015-11-15T00:00:00Z", "one"), (51, "2015-12-15T00:00:00Z", "two")],
            )],
        );

        let model = Arc::new(CountingModel::new(ModelKind::Classifier));
        let coordinator = ScoringCoordinatorBuilder::new(model.clone(), ts("2016-02-15"))
            .with_score_at(ScoreAt::Monthly)
            .with_output_features(true)
            .with_processes(1)
            .build()
            .unwrap();
        assert_eq!(coordinator.schema().headers().last(), Some(&"features"));

        let mut sink = coordinator.writer(Vec::new()).unwrap();
        let stats = coordinator.run(&[dump], &mut sink).await.unwrap();
        assert_eq!(stats.rows_written, 3);
        assert_eq!(model.calls(), 2);

        let lines = output(sink);
        assert_eq!(
            &lines[1..],
            &[
                "5\tMonthly\t50\t20151201000000\tStub\t0.0\t{\"wikitext.chars\":3.0}",
                "5\tMonthly\t51\t20160101000000\tStub\t0.0\t{\"wikitext.chars\":3.0}",
                "5\tMonthly\t51\t20160201000000\tStub\t0.0\t{\"wikitext.chars\":3.0}",
            ]
        );
    }

    #[test]
    fn test_builder_validation() {
        let model = Arc::new(CountingModel::new(ModelKind::Classifier));

        let err = ScoringCoordinatorBuilder::new(model.clone(), ts("2016-01-01"))
            .with_processes(0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidProcesses));

        let err = ScoringCoordinatorBuilder::new(model, ts("2016-01-01"))
            .with_class_weights(ClassWeights::empty())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnweightedLabel { .. }));
    }
}
