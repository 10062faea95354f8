//! Page sampling strategies
//!
//! A strategy turns one page's revision stream into the rows to score:
//!
//! - [`SamplingPolicy::Revision`]: every revision at its own timestamp
//! - [`SamplingPolicy::Latest`]: the last revision, reported at the sunset
//! - [`SamplingPolicy::Thresholds`]: the revision in effect at each calendar
//!   threshold, i.e. the last one saved before it
//!
//! Each strategy is a lazy iterator that makes a single forward pass over the
//! revisions. A revision that stands for several thresholds is scored once and
//! every row shares the same [`ScoreOutcome`].

use super::adapter::{score_text, ScoreOutcome};
use super::calendar::{thresholds_from, ScoreAt, START_YEAR};
use super::resume::Watermarks;
use crate::dump::DumpError;
use crate::model::QualityModel;
use crate::types::{PageHeader, PageId, Revision, RevisionId, Timestamp};
use std::collections::VecDeque;
use std::sync::Arc;

/// Run-wide inputs, immutable and shared by every worker
#[derive(Debug)]
pub struct ScoringContext {
    pub model: Arc<dyn QualityModel>,
    /// No row is reported after this instant
    pub sunset: Timestamp,
    pub watermarks: Watermarks,
    /// Include feature values in each score
    pub return_features: bool,
}

impl ScoringContext {
    pub fn new(model: Arc<dyn QualityModel>, sunset: Timestamp) -> Self {
        Self {
            model,
            sunset,
            watermarks: Watermarks::new(),
            return_features: false,
        }
    }

    pub fn with_watermarks(mut self, watermarks: Watermarks) -> Self {
        self.watermarks = watermarks;
        self
    }

    pub fn with_features(mut self, return_features: bool) -> Self {
        self.return_features = return_features;
        self
    }

    fn score(&self, text: &str) -> Arc<ScoreOutcome> {
        Arc::new(score_text(self.model.as_ref(), text, self.return_features))
    }
}

/// A revision chosen for output, with the instant it is reported at
#[derive(Debug, Clone)]
pub struct ScoredRevision {
    pub page_id: PageId,
    pub title: Arc<str>,
    pub rev_id: RevisionId,
    /// As-of timestamp
    pub timestamp: Timestamp,
    pub outcome: Arc<ScoreOutcome>,
}

impl ScoredRevision {
    fn new(header: &PageHeader, rev_id: RevisionId, timestamp: Timestamp, outcome: Arc<ScoreOutcome>) -> Self {
        Self {
            page_id: header.id,
            title: Arc::clone(&header.title),
            rev_id,
            timestamp,
            outcome,
        }
    }
}

/// Which revisions of each page are scored, and as of when
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplingPolicy {
    Revision,
    Latest,
    /// Ascending calendar thresholds
    Thresholds(Vec<Timestamp>),
}

impl SamplingPolicy {
    pub fn new(score_at: ScoreAt, sunset: Timestamp) -> Self {
        Self::with_start_year(score_at, sunset, START_YEAR)
    }

    pub fn with_start_year(score_at: ScoreAt, sunset: Timestamp, start_year: i32) -> Self {
        if let Some(granularity) = score_at.granularity() {
            return Self::Thresholds(thresholds_from(start_year, sunset, granularity));
        }
        if score_at == ScoreAt::Revision {
            Self::Revision
        } else {
            Self::Latest
        }
    }

    /// Rows to score for one page.
    ///
    /// Pages outside the main namespace and redirects yield nothing and their
    /// revisions are never read.
    pub fn sample<'a, I>(&'a self, ctx: &'a ScoringContext, header: PageHeader, revisions: I) -> PageScores<'a, I>
    where
        I: Iterator<Item = Result<Revision, DumpError>>,
    {
        if !header.is_scorable() {
            return PageScores::Skipped;
        }
        let watermark = ctx.watermarks.get(header.id);

        match self {
            Self::Revision => PageScores::Revision(RevisionScores {
                ctx,
                header,
                revisions,
                watermark,
            }),
            Self::Latest => {
                if watermark.is_some_and(|w| w >= ctx.sunset) {
                    return PageScores::Skipped;
                }
                PageScores::Latest(LatestScore {
                    ctx,
                    header,
                    revisions: Some(revisions),
                })
            }
            Self::Thresholds(thresholds) => PageScores::Thresholds(ThresholdScores {
                ctx,
                header,
                revisions,
                thresholds,
                watermark,
                pending: None,
                previous: None,
                batch: None,
                exhausted: false,
            }),
        }
    }
}

/// Rows for one page under any policy
pub enum PageScores<'a, I> {
    Skipped,
    Revision(RevisionScores<'a, I>),
    Latest(LatestScore<'a, I>),
    Thresholds(ThresholdScores<'a, I>),
}

impl<I> Iterator for PageScores<'_, I>
where
    I: Iterator<Item = Result<Revision, DumpError>>,
{
    type Item = Result<ScoredRevision, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Skipped => None,
            Self::Revision(rows) => rows.next(),
            Self::Latest(rows) => rows.next(),
            Self::Thresholds(rows) => rows.next(),
        }
    }
}

/// Every revision newer than the page's watermark
pub struct RevisionScores<'a, I> {
    ctx: &'a ScoringContext,
    header: PageHeader,
    revisions: I,
    watermark: Option<Timestamp>,
}

impl<I> Iterator for RevisionScores<'_, I>
where
    I: Iterator<Item = Result<Revision, DumpError>>,
{
    type Item = Result<ScoredRevision, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let revision = match self.revisions.next()? {
                Ok(revision) => revision,
                Err(e) => return Some(Err(e)),
            };
            if self.watermark.is_some_and(|w| w >= revision.timestamp) {
                continue;
            }

            let outcome = self.ctx.score(&revision.text);
            return Some(Ok(ScoredRevision::new(
                &self.header,
                revision.id,
                revision.timestamp,
                outcome,
            )));
        }
    }
}

/// The final revision, reported at the sunset
pub struct LatestScore<'a, I> {
    ctx: &'a ScoringContext,
    header: PageHeader,
    revisions: Option<I>,
}

impl<I> Iterator for LatestScore<'_, I>
where
    I: Iterator<Item = Result<Revision, DumpError>>,
{
    type Item = Result<ScoredRevision, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        let revisions = self.revisions.take()?;

        let mut last = None;
        for revision in revisions {
            match revision {
                Ok(revision) => last = Some(revision),
                Err(e) => return Some(Err(e)),
            }
        }
        let last = last?;

        let outcome = self.ctx.score(&last.text);
        Some(Ok(ScoredRevision::new(&self.header, last.id, self.ctx.sunset, outcome)))
    }
}

/// One row per calendar threshold, attributed to the revision in effect then
pub struct ThresholdScores<'a, I> {
    ctx: &'a ScoringContext,
    header: PageHeader,
    revisions: I,
    thresholds: &'a [Timestamp],
    watermark: Option<Timestamp>,
    /// Thresholds still to report, fixed at the first revision
    pending: Option<VecDeque<Timestamp>>,
    previous: Option<Revision>,
    batch: Option<Batch>,
    exhausted: bool,
}

/// A scored revision still owed rows
struct Batch {
    rev_id: RevisionId,
    outcome: Arc<ScoreOutcome>,
    /// Timestamp of the revision that replaced it, `None` if it is the last
    superseded_at: Option<Timestamp>,
}

impl<I> ThresholdScores<'_, I> {
    fn advance(&mut self, revision: Revision) {
        let timestamp = revision.timestamp;
        let (thresholds, sunset, watermark) = (self.thresholds, self.ctx.sunset, self.watermark);
        let pending = self
            .pending
            .get_or_insert_with(|| prune(thresholds, timestamp, sunset, watermark));

        if pending.front().is_some_and(|&t| timestamp > t) {
            if let Some(previous) = self.previous.take() {
                self.batch = Some(Batch {
                    rev_id: previous.id,
                    outcome: self.ctx.score(&previous.text),
                    superseded_at: Some(timestamp),
                });
            }
        }

        self.previous = Some(revision);
    }

    /// The last revision holds every threshold still pending
    fn finish(&mut self) {
        if !self.pending.as_ref().is_some_and(|p| !p.is_empty()) {
            return;
        }
        if let Some(last) = self.previous.take() {
            self.batch = Some(Batch {
                rev_id: last.id,
                outcome: self.ctx.score(&last.text),
                superseded_at: None,
            });
        }
    }

    fn drain_batch(&mut self) -> Option<ScoredRevision> {
        let batch = self.batch.as_ref()?;
        let pending = self.pending.as_mut()?;

        match pending.front().copied() {
            Some(threshold) if batch.superseded_at.map_or(true, |at| at > threshold) => {
                pending.pop_front();
                Some(ScoredRevision::new(
                    &self.header,
                    batch.rev_id,
                    threshold,
                    Arc::clone(&batch.outcome),
                ))
            }
            _ => {
                self.batch = None;
                None
            }
        }
    }
}

impl<I> Iterator for ThresholdScores<'_, I>
where
    I: Iterator<Item = Result<Revision, DumpError>>,
{
    type Item = Result<ScoredRevision, DumpError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.drain_batch() {
                return Some(Ok(row));
            }
            if self.exhausted {
                return None;
            }

            match self.revisions.next() {
                Some(Ok(revision)) => self.advance(revision),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
                None => {
                    self.exhausted = true;
                    self.finish();
                }
            }
        }
    }
}

/// Thresholds after the first revision, at or before the sunset and past the watermark
fn prune(
    thresholds: &[Timestamp],
    first_revision: Timestamp,
    sunset: Timestamp,
    watermark: Option<Timestamp>,
) -> VecDeque<Timestamp> {
    thresholds
        .iter()
        .copied()
        .filter(|&t| t > first_revision && t <= sunset && watermark.map_or(true, |w| t > w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use crate::scoring::calendar::Granularity;
    use crate::scoring::testing::{CountingModel, FailingModel};

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn rev(id: RevisionId, timestamp: &str, text: &str) -> Result<Revision, DumpError> {
        Ok(Revision::new(id, ts(timestamp), text))
    }

    fn article() -> PageHeader {
        PageHeader::new(7, "Article", 0)
    }

    fn counting() -> Arc<CountingModel> {
        Arc::new(CountingModel::new(ModelKind::ProbabilityClassifier))
    }

    fn rows<I>(scores: PageScores<'_, I>) -> Vec<ScoredRevision>
    where
        I: Iterator<Item = Result<Revision, DumpError>>,
    {
        scores.map(|r| r.unwrap()).collect()
    }

    fn summary(rows: &[ScoredRevision]) -> Vec<(RevisionId, String)> {
        rows.iter().map(|r| (r.rev_id, r.timestamp.short_format())).collect()
    }

    fn prediction(row: &ScoredRevision) -> &str {
        let outcome: &ScoreOutcome = &row.outcome;
        &outcome.as_ref().unwrap().prediction
    }

    fn jan_to_mar_2010() -> SamplingPolicy {
        SamplingPolicy::Thresholds(vec![ts("2010-01-01"), ts("2010-02-01"), ts("2010-03-01")])
    }

    #[test]
    fn test_policy_from_score_at() {
        let sunset = ts("2016-03-01");
        assert_eq!(SamplingPolicy::new(ScoreAt::Revision, sunset), SamplingPolicy::Revision);
        assert_eq!(SamplingPolicy::new(ScoreAt::Latest, sunset), SamplingPolicy::Latest);
        assert_eq!(
            SamplingPolicy::new(ScoreAt::Annually, sunset),
            SamplingPolicy::Thresholds(crate::scoring::calendar::thresholds(sunset, Granularity::Annually))
        );
    }

    #[test]
    fn test_revision_policy_scores_every_revision() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01"));
        let revisions = vec![
            rev(1, "2010-01-01T00:00:00Z", "short"),
            rev(2, "2011-01-01T00:00:00Z", "a much longer text"),
            rev(3, "2012-01-01T00:00:00Z", "tiny"),
        ];

        let rows = rows(SamplingPolicy::Revision.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(
            summary(&rows),
            vec![
                (1, "20100101000000".to_string()),
                (2, "20110101000000".to_string()),
                (3, "20120101000000".to_string()),
            ]
        );
        assert_eq!(prediction(&rows[1]), "FA");
        assert_eq!(&*rows[0].title, "Article");
        assert_eq!(rows[0].page_id, 7);
        assert_eq!(model.calls(), 3);
    }

    #[test]
    fn test_revision_policy_respects_watermark() {
        let model = counting();
        let watermarks: Watermarks = [(7, ts("2011-01-01"))].into_iter().collect();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01")).with_watermarks(watermarks);
        let revisions = vec![
            rev(1, "2010-01-01T00:00:00Z", "a"),
            rev(2, "2011-01-01T00:00:00Z", "b"),
            rev(3, "2012-01-01T00:00:00Z", "c"),
        ];

        let rows = rows(SamplingPolicy::Revision.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(summary(&rows), vec![(3, "20120101000000".to_string())]);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_latest_policy_reports_at_sunset() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01"));
        let revisions = vec![
            rev(1, "2010-01-01T00:00:00Z", "first"),
            rev(2, "2013-05-06T07:08:09Z", "the final and longest text"),
        ];

        let rows = rows(SamplingPolicy::Latest.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(summary(&rows), vec![(2, "20160101000000".to_string())]);
        assert_eq!(prediction(&rows[0]), "FA");
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_latest_policy_watermark() {
        let model = counting();
        let sunset = ts("2016-01-01");

        let at_sunset: Watermarks = [(7, sunset)].into_iter().collect();
        let ctx = ScoringContext::new(model.clone(), sunset).with_watermarks(at_sunset);
        let revisions = vec![rev(1, "2010-01-01T00:00:00Z", "text")];
        assert!(rows(SamplingPolicy::Latest.sample(&ctx, article(), revisions.into_iter())).is_empty());
        assert_eq!(model.calls(), 0);

        let before: Watermarks = [(7, ts("2015-12-31"))].into_iter().collect();
        let ctx = ScoringContext::new(model.clone(), sunset).with_watermarks(before);
        let revisions = vec![rev(1, "2010-01-01T00:00:00Z", "text")];
        assert_eq!(rows(SamplingPolicy::Latest.sample(&ctx, article(), revisions.into_iter())).len(), 1);
    }

    #[test]
    fn test_latest_policy_without_revisions() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01"));
        let revisions: Vec<Result<Revision, DumpError>> = Vec::new();
        assert!(rows(SamplingPolicy::Latest.sample(&ctx, article(), revisions.into_iter())).is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_thresholds_between_revisions_share_one_score() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2010-03-31"));
        let policy = jan_to_mar_2010();
        let revisions = vec![
            rev(1, "2009-12-15T00:00:00Z", "before the thresholds"),
            rev(2, "2010-03-15T00:00:00Z", "after"),
        ];

        let rows = rows(policy.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(
            summary(&rows),
            vec![
                (1, "20100101000000".to_string()),
                (1, "20100201000000".to_string()),
                (1, "20100301000000".to_string()),
            ]
        );
        assert!(Arc::ptr_eq(&rows[0].outcome, &rows[1].outcome));
        assert!(Arc::ptr_eq(&rows[1].outcome, &rows[2].outcome));
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_thresholds_attribute_to_revision_in_effect() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2010-06-01"));
        let policy = jan_to_mar_2010();
        let revisions = vec![
            rev(1, "2009-12-15T00:00:00Z", "one"),
            rev(2, "2010-01-20T00:00:00Z", "two"),
            rev(3, "2010-01-25T00:00:00Z", "three"),
            rev(4, "2010-02-10T00:00:00Z", "four"),
        ];

        let rows = rows(policy.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(
            summary(&rows),
            vec![
                (1, "20100101000000".to_string()),
                (3, "20100201000000".to_string()),
                (4, "20100301000000".to_string()),
            ]
        );
        assert_eq!(model.calls(), 3);
    }

    #[test]
    fn test_last_revision_holds_remaining_thresholds() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2010-02-15"));
        let policy = jan_to_mar_2010();
        let revisions = vec![rev(1, "2009-06-01T00:00:00Z", "only")];

        let rows = rows(policy.sample(&ctx, article(), revisions.into_iter()));
        // 2010-03-01 is past the sunset
        assert_eq!(
            summary(&rows),
            vec![(1, "20100101000000".to_string()), (1, "20100201000000".to_string())]
        );
        assert!(Arc::ptr_eq(&rows[0].outcome, &rows[1].outcome));
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_thresholds_respect_watermark() {
        let model = counting();
        let watermarks: Watermarks = [(7, ts("2010-01-01"))].into_iter().collect();
        let ctx = ScoringContext::new(model.clone(), ts("2010-12-31")).with_watermarks(watermarks);
        let policy = jan_to_mar_2010();
        let revisions = vec![
            rev(1, "2009-12-15T00:00:00Z", "one"),
            rev(2, "2010-02-15T00:00:00Z", "two"),
        ];

        let rows = rows(policy.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(
            summary(&rows),
            vec![(1, "20100201000000".to_string()), (2, "20100301000000".to_string())]
        );
        assert!(rows.iter().all(|r| r.timestamp > ts("2010-01-01")));
    }

    #[test]
    fn test_no_pending_thresholds_means_no_scoring() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01"));
        let policy = jan_to_mar_2010();
        let revisions = vec![
            rev(1, "2011-01-01T00:00:00Z", "created after every threshold"),
            rev(2, "2012-01-01T00:00:00Z", "edit"),
        ];

        assert!(rows(policy.sample(&ctx, article(), revisions.into_iter())).is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_threshold_at_revision_instant_goes_to_that_revision() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2010-01-15"));
        let policy = jan_to_mar_2010();
        let revisions = vec![
            rev(1, "2009-12-01T00:00:00Z", "one"),
            rev(2, "2010-01-01T00:00:00Z", "two"),
        ];

        let rows = rows(policy.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(summary(&rows), vec![(2, "20100101000000".to_string())]);
    }

    #[test]
    fn test_ineligible_pages_are_never_read() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01"));
        let talk = PageHeader::new(8, "Talk:Article", 1);
        let redirect = PageHeader::new(9, "Redirect", 0).with_redirect(true);

        for policy in [SamplingPolicy::Revision, SamplingPolicy::Latest, jan_to_mar_2010()] {
            for header in [talk.clone(), redirect.clone()] {
                let untouched = std::iter::from_fn(|| -> Option<Result<Revision, DumpError>> {
                    panic!("revisions of an ineligible page were read")
                });
                assert!(rows(policy.sample(&ctx, header, untouched)).is_empty());
            }
        }
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn test_scoring_failures_are_carried_in_rows() {
        let ctx = ScoringContext::new(Arc::new(FailingModel::new(ModelKind::Classifier)), ts("2016-01-01"));
        let revisions = vec![rev(1, "2010-01-01T00:00:00Z", "text")];

        let rows = rows(SamplingPolicy::Revision.sample(&ctx, article(), revisions.into_iter()));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].outcome.is_err());
    }

    #[test]
    fn test_dump_errors_end_the_page() {
        let model = counting();
        let ctx = ScoringContext::new(model.clone(), ts("2016-01-01"));
        let revisions = vec![
            rev(1, "2010-01-01T00:00:00Z", "text"),
            Err(DumpError::InvalidFormat("broken revision".to_string())),
            rev(3, "2012-01-01T00:00:00Z", "never reached"),
        ];

        let policy = jan_to_mar_2010();
        let mut scores = policy.sample(&ctx, article(), revisions.into_iter());
        assert!(matches!(scores.next(), Some(Err(DumpError::InvalidFormat(_)))));
        assert!(scores.next().is_none());
        assert_eq!(model.calls(), 0);
    }
}
