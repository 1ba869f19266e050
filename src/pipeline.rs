use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channels::ChannelTarget;
use crate::classifier::Classifier;
use crate::fetcher::PageFetcher;
use crate::output::{reconcile_output, OutputOutcome};
use crate::parser::parse_channel_page;
use crate::parser::records::{ClassifiedItem, MessageRecord};

/// Counters for one run, printed by `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub channels: usize,
    pub fetch_failures: usize,
    pub records: usize,
    pub retained: usize,
    pub written: usize,
    pub removed: usize,
    pub persistence_failures: usize,
}

/// Result of fetching, parsing and filtering one channel.
#[derive(Debug)]
pub struct ChannelBatch {
    pub target: ChannelTarget,
    pub fetched: bool,
    pub records: usize,
    pub items: Vec<ClassifiedItem>,
}

/// Fetch → extract → order → classify for each channel, then reconcile its
/// output file. One worker processes channels strictly in list order with a
/// pause between fetches; more workers share a global fetch-rate limit.
pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    classifier: Arc<Classifier>,
    out_dir: PathBuf,
    delay: Duration,
    workers: usize,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        classifier: Classifier,
        out_dir: PathBuf,
        delay: Duration,
        workers: usize,
    ) -> Self {
        Pipeline {
            fetcher,
            classifier: Arc::new(classifier),
            out_dir,
            delay,
            workers: workers.max(1),
        }
    }

    pub async fn run(&self, targets: Vec<ChannelTarget>) -> RunSummary {
        let pb = ProgressBar::new(targets.len() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }

        let summary = if self.workers == 1 {
            self.run_sequential(targets, &pb).await
        } else {
            self.run_pooled(targets, &pb).await
        };

        pb.finish_and_clear();
        info!(
            channels = summary.channels,
            fetch_failures = summary.fetch_failures,
            retained = summary.retained,
            "Run finished"
        );
        summary
    }

    async fn run_sequential(&self, targets: Vec<ChannelTarget>, pb: &ProgressBar) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = targets.len();

        for (i, target) in targets.into_iter().enumerate() {
            pb.set_message(target.base_name.clone());
            let batch = process_channel(self.fetcher.as_ref(), &self.classifier, target).await;
            self.persist(&batch, &mut summary);
            pb.inc(1);

            if i + 1 != total && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        summary
    }

    async fn run_pooled(&self, targets: Vec<ChannelTarget>, pb: &ProgressBar) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let limiter = Arc::new(RateLimiter::new(self.delay));

        // Workers send finished batches tagged with their list position;
        // this task is the only writer.
        let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, ChannelBatch)>(self.workers * 2);

        for (pos, target) in targets.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let classifier = Arc::clone(&self.classifier);
            let sem = Arc::clone(&semaphore);
            let limiter = Arc::clone(&limiter);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return;
                };
                limiter.wait().await;
                let batch = process_channel(fetcher.as_ref(), &classifier, target).await;
                let _ = tx.send((pos, batch)).await;
            });
        }

        // rx closes once every task has dropped its sender
        drop(tx);

        // Batches arrive as they finish but are saved in list order, so the
        // later of two channels sharing a base name owns the file.
        let mut summary = RunSummary::default();
        let mut held: BTreeMap<usize, ChannelBatch> = BTreeMap::new();
        let mut next = 0;
        while let Some((pos, batch)) = rx.recv().await {
            held.insert(pos, batch);
            while let Some(batch) = held.remove(&next) {
                self.save_in_order(&batch, &mut summary, pb);
                next += 1;
            }
        }
        // only non-empty if a task died before sending
        for batch in held.into_values() {
            self.save_in_order(&batch, &mut summary, pb);
        }
        summary
    }

    fn save_in_order(&self, batch: &ChannelBatch, summary: &mut RunSummary, pb: &ProgressBar) {
        pb.set_message(batch.target.base_name.clone());
        self.persist(batch, summary);
        pb.inc(1);
    }

    fn persist(&self, batch: &ChannelBatch, summary: &mut RunSummary) {
        summary.channels += 1;
        summary.records += batch.records;
        summary.retained += batch.items.len();
        if !batch.fetched {
            summary.fetch_failures += 1;
        }

        let path = batch.target.output_path(&self.out_dir);
        match reconcile_output(&path, &batch.items) {
            Ok(OutputOutcome::Written { .. }) => summary.written += 1,
            Ok(OutputOutcome::Removed { .. }) => summary.removed += 1,
            Ok(OutputOutcome::Untouched) => {}
            Err(e) => {
                summary.persistence_failures += 1;
                error!(url = %batch.target.url, error = %e, "Failed to update output");
            }
        }
    }
}

/// Fetch one channel and keep its config-bearing messages, newest first.
/// A failed fetch is logged and yields an empty batch.
pub async fn process_channel(
    fetcher: &dyn PageFetcher,
    classifier: &Classifier,
    target: ChannelTarget,
) -> ChannelBatch {
    let (fetched, records) = match fetcher.fetch(&target.url).await {
        Ok(html) => (true, parse_channel_page(&html)),
        Err(e) => {
            warn!(url = %target.url, error = %e, "Fetch failed; treating channel as empty");
            (false, Vec::new())
        }
    };
    info!(url = %target.url, messages = records.len(), "Parsed channel page");

    let record_count = records.len();
    let items = select_configs(classifier, records);
    ChannelBatch {
        target,
        fetched,
        records: record_count,
        items,
    }
}

/// Keep records whose body classifies as a config, preserving order.
pub fn select_configs(classifier: &Classifier, records: Vec<MessageRecord>) -> Vec<ClassifiedItem> {
    records
        .into_iter()
        .filter_map(|r| {
            let signal = classifier.detect(&r.body_text)?;
            debug!(index = r.index, post = ?r.post_id, %signal, "Config message");
            Some(ClassifiedItem::from(r))
        })
        .collect()
}

/// Spaces successive `wait` returns by at least `interval`, across all callers.
struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(interval: Duration) -> Self {
        RateLimiter {
            interval,
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use async_trait::async_trait;

    use super::*;
    use crate::error::FetchError;

    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        slow: HashMap<String, Duration>,
        fetched_at: std::sync::Mutex<Vec<Instant>>,
    }

    impl StubFetcher {
        fn new(pages: Vec<(&str, String)>) -> Self {
            StubFetcher {
                pages: pages.into_iter().map(|(u, p)| (u.to_string(), p)).collect(),
                ..Default::default()
            }
        }

        fn slow_for(mut self, url: &str, d: Duration) -> Self {
            self.slow.insert(url.to_string(), d);
            self
        }

        fn fetch_times(&self) -> Vec<Instant> {
            self.fetched_at.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.fetched_at.lock().unwrap().push(Instant::now());
            if let Some(d) = self.slow.get(url) {
                tokio::time::sleep(*d).await;
            }
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn page(messages: &[(&str, Option<&str>, &str)]) -> String {
        let mut html = String::from(
            r#"<html><body><section class="tgme_channel_history js-message_history">"#,
        );
        for (post, ts, body) in messages {
            let time = ts
                .map(|t| format!(r#"<time datetime="{}">t</time>"#, t))
                .unwrap_or_default();
            html.push_str(&format!(
                r#"<div class="tgme_widget_message_wrap js-widget_message_wrap">
                     <div class="tgme_widget_message" data-post="{post}">
                       <div class="tgme_widget_message_user"><a href="https://t.me/src"></a></div>
                       <div class="tgme_widget_message_text">{body}</div>
                       {time}
                     </div>
                   </div>"#
            ));
        }
        html.push_str("</section></body></html>");
        html
    }

    fn pipeline(pages: Vec<(&str, String)>, out_dir: &Path, workers: usize) -> Pipeline {
        paced(Arc::new(StubFetcher::new(pages)), out_dir, Duration::ZERO, workers)
    }

    fn paced(fetcher: Arc<StubFetcher>, out_dir: &Path, delay: Duration, workers: usize) -> Pipeline {
        Pipeline::new(fetcher, Classifier::default(), out_dir.to_path_buf(), delay, workers)
    }

    fn gaps(mut times: Vec<Instant>) -> Vec<Duration> {
        times.sort();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn read_items(path: &Path) -> Vec<ClassifiedItem> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn targets(urls: &[&str]) -> Vec<ChannelTarget> {
        urls.iter().map(|u| ChannelTarget::new(u)).collect()
    }

    #[tokio::test]
    async fn keeps_configs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let html = page(&[
            ("a/1", Some("2025-01-01T00:00:00Z"), "vmess://old"),
            ("a/2", Some("2025-01-02T00:00:00Z"), "just chatting"),
            ("a/3", Some("2025-01-03T00:00:00Z"), "fresh  trojan://new  "),
        ]);
        let p = pipeline(vec![("https://t.me/s/alpha", html)], dir.path(), 1);

        let summary = p.run(targets(&["https://t.me/s/alpha"])).await;
        assert_eq!(summary.records, 3);
        assert_eq!(summary.retained, 2);
        assert_eq!(summary.written, 1);

        let items = read_items(&dir.path().join("alpha.json"));
        let posts: Vec<_> = items.iter().map(|i| i.post_id.as_deref().unwrap()).collect();
        assert_eq!(posts, vec!["a/3", "a/1"]);
        // indices come from the full ordered batch, not the filtered list
        assert_eq!(items[0].index, 1);
        assert_eq!(items[1].index, 3);
        assert_eq!(items[0].body_text, "fresh  trojan://new");
        assert_eq!(items[0].source_href.as_deref(), Some("https://t.me/src"));
    }

    #[tokio::test]
    async fn no_matches_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("quiet.json");
        std::fs::write(&stale, "[{\"bodyText\":\"vmess://gone\"}]").unwrap();

        let html = page(&[("q/1", None, "nothing to see")]);
        let p = pipeline(vec![("https://t.me/s/quiet", html)], dir.path(), 1);

        let summary = p.run(targets(&["https://t.me/s/quiet"])).await;
        assert_eq!(summary.removed, 1);
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn fetch_failure_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("down.json");
        std::fs::write(&stale, "[]").unwrap();

        let html = page(&[("ok/1", None, "ss://abc")]);
        let p = pipeline(vec![("https://t.me/s/ok", html)], dir.path(), 1);

        let summary = p
            .run(targets(&["https://t.me/s/down", "https://t.me/s/ok"]))
            .await;
        assert_eq!(summary.channels, 2);
        assert_eq!(summary.fetch_failures, 1);
        assert!(!stale.exists());
        assert_eq!(read_items(&dir.path().join("ok.json")).len(), 1);
    }

    #[tokio::test]
    async fn pooled_run_matches_sequential() {
        let pages = || {
            vec![
                ("https://t.me/s/one", page(&[("1/1", None, "vless://x")])),
                ("https://t.me/s/two", page(&[("2/1", None, "hello")])),
                ("https://t.me/s/three", page(&[("3/1", None, "hysteria2://y"), ("3/2", None, "socks://z")])),
            ]
        };
        let urls = ["https://t.me/s/one", "https://t.me/s/two", "https://t.me/s/three"];

        let seq_dir = tempfile::tempdir().unwrap();
        let seq = pipeline(pages(), seq_dir.path(), 1).run(targets(&urls)).await;

        let pool_dir = tempfile::tempdir().unwrap();
        let pool = pipeline(pages(), pool_dir.path(), 3).run(targets(&urls)).await;

        assert_eq!(seq, pool);
        for name in ["one.json", "three.json"] {
            assert_eq!(
                read_items(&seq_dir.path().join(name)),
                read_items(&pool_dir.path().join(name))
            );
        }
        assert!(!pool_dir.path().join("two.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn later_channel_wins_shared_name_when_pooled() {
        let dir = tempfile::tempdir().unwrap();
        let first = "https://x.org/a/chan";
        let later = "https://y.org/b/chan";
        let fetcher = StubFetcher::new(vec![
            (first, page(&[("a/1", None, "vmess://from-first")])),
            (later, page(&[("b/1", None, "vmess://from-later")])),
        ])
        .slow_for(first, Duration::from_millis(200));
        let p = paced(Arc::new(fetcher), dir.path(), Duration::ZERO, 2);

        let summary = p.run(targets(&[first, later])).await;
        assert_eq!(summary.written, 2);
        let items = read_items(&dir.path().join("chan.json"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body_text, "vmess://from-later");
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_run_pauses_between_channels_only() {
        let dir = tempfile::tempdir().unwrap();
        let delay = Duration::from_secs(5);
        let urls = ["https://t.me/s/a", "https://t.me/s/b", "https://t.me/s/c"];
        let fetcher = Arc::new(StubFetcher::new(
            urls.iter().map(|u| (*u, page(&[("p/1", None, "hi")]))).collect(),
        ));
        let p = paced(Arc::clone(&fetcher), dir.path(), delay, 1);

        let start = Instant::now();
        p.run(targets(&urls)).await;
        let elapsed = start.elapsed();

        let times = fetcher.fetch_times();
        assert_eq!(times.len(), 3);
        assert!(gaps(times).iter().all(|g| *g >= delay));
        // two pauses, none after the last channel
        assert!(elapsed >= delay * 2);
        assert!(elapsed < delay * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pooled_run_spaces_fetch_starts() {
        let dir = tempfile::tempdir().unwrap();
        let delay = Duration::from_secs(2);
        let urls = [
            "https://t.me/s/a",
            "https://t.me/s/b",
            "https://t.me/s/c",
            "https://t.me/s/d",
        ];
        let fetcher = Arc::new(StubFetcher::new(
            urls.iter().map(|u| (*u, page(&[("p/1", None, "hi")]))).collect(),
        ));
        let p = paced(Arc::clone(&fetcher), dir.path(), delay, 3);

        let summary = p.run(targets(&urls)).await;
        assert_eq!(summary.channels, 4);

        let times = fetcher.fetch_times();
        assert_eq!(times.len(), 4);
        let gaps = gaps(times);
        assert_eq!(gaps.len(), 3);
        assert!(gaps.iter().all(|g| *g >= delay), "gaps: {:?}", gaps);
    }

    #[test]
    fn select_configs_keeps_body_untouched() {
        let body = "  Server list:\n\tVMESS://eyJ2IjoiMiJ9  ";
        let record = MessageRecord {
            index: 4,
            post_id: None,
            author: Default::default(),
            body_text: body.to_string(),
            body_html: String::new(),
            view_count: None,
            timestamp: None,
            reactions: Vec::new(),
        };
        let items = select_configs(&Classifier::default(), vec![record]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body_text, body);
        assert_eq!(items[0].index, 4);
        assert!(items[0].source_href.is_none());
    }
}
