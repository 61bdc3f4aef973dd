//! Trial selection and the per-kind search plans.
//!
//! The selection rule: prefer the largest trial that fits the target; if
//! nothing fits, the smallest trial seen. A trial that fits and reaches
//! `good_enough_ratio` of the target ends the search.

use std::path::{Path, PathBuf};

use super::{Knob, TrialEncoder};
use crate::workspace::TrialWorkspace;

/// One encoded candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub knob: Knob,
    pub size: u64,
    pub path: PathBuf,
}

/// Keeps the best trial seen so far.
#[derive(Debug)]
pub struct TrialSelector {
    target: u64,
    good_enough: f64,
    best: Option<Trial>,
    satisfied: bool,
}

impl TrialSelector {
    pub fn new(target: u64, good_enough_ratio: f64) -> Self {
        Self {
            target,
            good_enough: target as f64 * good_enough_ratio,
            best: None,
            satisfied: false,
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Whether `candidate` bytes should replace `current` bytes.
    pub fn prefers(&self, candidate: u64, current: u64) -> bool {
        let fits = |s: u64| s <= self.target;
        match (fits(candidate), fits(current)) {
            (true, true) => candidate > current,
            (true, false) => true,
            (false, true) => false,
            (false, false) => candidate < current,
        }
    }

    /// Offer a trial. Returns whichever trial lost, so its file can be
    /// deleted.
    pub fn offer(&mut self, trial: Trial) -> Option<Trial> {
        if trial.size <= self.target && trial.size as f64 >= self.good_enough {
            self.satisfied = true;
        }
        match self.best.take() {
            None => {
                self.best = Some(trial);
                None
            }
            Some(current) if self.prefers(trial.size, current.size) => {
                self.best = Some(trial);
                Some(current)
            }
            Some(current) => {
                self.best = Some(current);
                Some(trial)
            }
        }
    }

    /// A good-enough trial has been seen.
    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn best(&self) -> Option<&Trial> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<Trial> {
        self.best
    }
}

/// Drives trials for one compression call: encode, measure, offer, and
/// delete the loser.
pub(crate) struct TrialRunner<'a> {
    encoder: &'a dyn TrialEncoder,
    source: &'a Path,
    ws: &'a TrialWorkspace,
    selector: TrialSelector,
    attempts: usize,
    last_error: Option<String>,
}

impl<'a> TrialRunner<'a> {
    pub(crate) fn new(
        encoder: &'a dyn TrialEncoder,
        source: &'a Path,
        ws: &'a TrialWorkspace,
        selector: TrialSelector,
    ) -> Self {
        Self {
            encoder,
            source,
            ws,
            selector,
            attempts: 0,
            last_error: None,
        }
    }

    /// Encode one trial. Returns its size, or `None` if the encode failed.
    pub(crate) async fn run(&mut self, knob: Knob) -> Option<u64> {
        self.attempts += 1;
        let dest = self.ws.trial_path(&knob.label());

        let size = match self.encoder.encode(self.source, &dest, knob).await {
            Ok(()) => std::fs::metadata(&dest).map(|m| m.len()),
            Err(e) => Err(std::io::Error::other(e.to_string())),
        };
        let size = match size {
            Ok(size) => size,
            Err(e) => {
                tracing::debug!(%knob, error = %e, "Trial failed");
                self.ws.discard(&dest);
                self.last_error = Some(e.to_string());
                return None;
            }
        };

        tracing::debug!(%knob, size, target = self.selector.target(), "Trial encoded");
        if let Some(loser) = self.selector.offer(Trial {
            knob,
            size,
            path: dest,
        }) {
            self.ws.discard(&loser.path);
        }
        Some(size)
    }

    pub(crate) fn fits(&self, size: u64) -> bool {
        size <= self.selector.target()
    }

    pub(crate) fn satisfied(&self) -> bool {
        self.selector.is_satisfied()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts
    }

    pub(crate) fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn into_best(self) -> Option<Trial> {
        self.selector.into_best()
    }
}

/// Round the midpoint of `lo..hi` to the nearest multiple of `step`.
pub fn refine_midpoint(lo: u8, hi: u8, step: u8) -> u8 {
    let step = step.max(1);
    let mid = (f64::from(lo) + f64::from(hi)) / 2.0;
    let snapped = (mid / f64::from(step)).round() * f64::from(step);
    snapped.clamp(0.0, 100.0) as u8
}

/// Quality search for still images.
///
/// Probes the coarse qualities from high to low until one fits. If none
/// fits, tries `floor` once. Otherwise binary-searches between the first
/// fitting quality and the probe tried just before it (100 when the highest
/// probe already fit), on a `step` grid. Every refinement quality lies
/// strictly between two already-tried ones, so no quality is encoded twice.
pub(crate) async fn search_quality(runner: &mut TrialRunner<'_>, probes: &[u8], floor: u8, step: u8) {
    let mut probes = probes.to_vec();
    probes.sort_unstable_by(|a, b| b.cmp(a));
    probes.dedup();

    let mut over: Option<u8> = None;
    let mut under: Option<u8> = None;

    for &q in &probes {
        match runner.run(Knob::Quality(q)).await {
            Some(size) if runner.fits(size) => {
                under = Some(q);
                break;
            }
            // A failed probe bounds the refinement like an overshoot.
            _ => over = Some(q),
        }
    }
    if runner.satisfied() {
        return;
    }

    let Some(mut lo) = under else {
        if probes.last().is_some_and(|&min| floor < min) {
            runner.run(Knob::Quality(floor)).await;
        }
        return;
    };

    let mut hi = over.unwrap_or(100);
    while hi.saturating_sub(lo) > step {
        let mid = refine_midpoint(lo, hi, step);
        if mid <= lo || mid >= hi {
            break;
        }
        match runner.run(Knob::Quality(mid)).await {
            Some(size) if runner.fits(size) => lo = mid,
            _ => hi = mid,
        }
        if runner.satisfied() {
            return;
        }
    }
}

/// Frame-rate search for GIFs: every whole rate from `source_fps` down to 1,
/// then 0.5.
///
/// Assumes output size falls as the rate falls. Under that assumption the
/// first fitting trial is the largest fit on the ladder, even when it lands
/// below the good-enough band: the rate one step above it already overshot,
/// or it is the source rate itself. The search therefore stops there.
pub(crate) async fn search_fps(runner: &mut TrialRunner<'_>, source_fps: u32) {
    let rates = (1..=source_fps.max(1))
        .rev()
        .map(f64::from)
        .chain(std::iter::once(0.5));

    for fps in rates {
        if let Some(size) = runner.run(Knob::Fps(fps)).await {
            if runner.fits(size) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn trial(size: u64) -> Trial {
        Trial {
            knob: Knob::Quality(50),
            size,
            path: PathBuf::from(format!("/tmp/t{size}")),
        }
    }

    #[test]
    fn prefers_largest_under_target() {
        let s = TrialSelector::new(100, 0.95);
        assert!(s.prefers(90, 80));
        assert!(!s.prefers(80, 90));
        assert!(s.prefers(100, 99));
    }

    #[test]
    fn under_target_beats_any_over() {
        let s = TrialSelector::new(100, 0.95);
        assert!(s.prefers(10, 101));
        assert!(!s.prefers(101, 10));
    }

    #[test]
    fn prefers_smallest_when_all_over() {
        let s = TrialSelector::new(100, 0.95);
        assert!(s.prefers(150, 200));
        assert!(!s.prefers(200, 150));
    }

    #[test]
    fn offer_returns_loser() {
        let mut s = TrialSelector::new(100, 0.95);
        assert_eq!(s.offer(trial(300)), None);
        assert_eq!(s.offer(trial(200)).map(|t| t.size), Some(300));
        assert_eq!(s.offer(trial(250)).map(|t| t.size), Some(250));
        assert_eq!(s.offer(trial(60)).map(|t| t.size), Some(200));
        assert!(!s.is_satisfied());
        assert_eq!(s.offer(trial(96)).map(|t| t.size), Some(60));
        assert!(s.is_satisfied());
        assert_eq!(s.best().map(|t| t.size), Some(96));
    }

    #[test]
    fn over_target_never_satisfies() {
        let mut s = TrialSelector::new(100, 0.95);
        s.offer(trial(101));
        assert!(!s.is_satisfied());
    }

    #[test]
    fn midpoint_snaps_to_grid() {
        assert_eq!(refine_midpoint(30, 50, 5), 40);
        assert_eq!(refine_midpoint(40, 50, 5), 45);
        assert_eq!(refine_midpoint(90, 100, 5), 95);
        assert_eq!(refine_midpoint(10, 30, 10), 20);
        assert_eq!(refine_midpoint(70, 90, 5), 80);
    }

    struct Scripted<F> {
        size_for: F,
        calls: Mutex<Vec<Knob>>,
    }

    #[async_trait]
    impl<F> TrialEncoder for Scripted<F>
    where
        F: Fn(Knob) -> Option<usize> + Send + Sync,
    {
        async fn encode(&self, _source: &Path, dest: &Path, knob: Knob) -> mm_core::Result<()> {
            self.calls.lock().unwrap().push(knob);
            match (self.size_for)(knob) {
                Some(n) => Ok(std::fs::write(dest, vec![1u8; n])?),
                None => Err(mm_core::Error::Internal("nope".into())),
            }
        }
    }

    fn qualities(calls: &Mutex<Vec<Knob>>) -> Vec<u8> {
        calls
            .lock()
            .unwrap()
            .iter()
            .map(|k| match k {
                Knob::Quality(q) => *q,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    async fn run_quality<F>(size_for: F, target: u64) -> (Vec<u8>, Option<Trial>, usize)
    where
        F: Fn(Knob) -> Option<usize> + Send + Sync,
    {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("img.jpg");
        std::fs::write(&src, b"src").unwrap();
        let ws = TrialWorkspace::new(&src).unwrap();
        let enc = Scripted {
            size_for,
            calls: Mutex::new(Vec::new()),
        };
        let mut runner = TrialRunner::new(&enc, &src, &ws, TrialSelector::new(target, 0.95));
        search_quality(&mut runner, &[90, 70, 50, 30, 10], 5, 5).await;
        let best = runner.into_best();
        let leftovers = std::fs::read_dir(ws.dir()).unwrap().count();
        (qualities(&enc.calls), best, leftovers)
    }

    fn linear(k: Knob) -> Option<usize> {
        match k {
            Knob::Quality(q) => Some(q as usize * 10),
            _ => None,
        }
    }

    #[tokio::test]
    async fn quality_search_refines_between_probes() {
        // target 620: 90 and 70 overshoot, 50 fits (500); refine 60 (600)
        // fits and is within 95%, so the search stops there.
        let (calls, best, leftovers) = run_quality(linear, 620).await;
        assert_eq!(calls, vec![90, 70, 50, 60]);
        assert_eq!(best.unwrap().knob, Knob::Quality(60));
        assert_eq!(leftovers, 1, "only the winner stays in the workspace");
    }

    #[tokio::test]
    async fn quality_search_early_exit_on_probe() {
        let (calls, best, _) = run_quality(linear, 700).await;
        assert_eq!(calls, vec![90, 70]);
        assert_eq!(best.unwrap().size, 700);
    }

    #[tokio::test]
    async fn quality_search_tries_floor_when_nothing_fits() {
        let (calls, best, _) = run_quality(linear, 20).await;
        assert_eq!(calls, vec![90, 70, 50, 30, 10, 5]);
        assert_eq!(best.unwrap().knob, Knob::Quality(5));
    }

    #[tokio::test]
    async fn quality_search_above_highest_probe() {
        // 90 fits at 900 of 1000 (90%); refine toward 100 with 95.
        let (calls, best, _) = run_quality(linear, 1000).await;
        assert_eq!(calls, vec![90, 95]);
        assert_eq!(best.unwrap().size, 950);
    }

    #[tokio::test]
    async fn quality_search_skips_failed_trials() {
        let (calls, best, leftovers) = run_quality(
            |k| match k {
                Knob::Quality(70) => None,
                other => linear(other),
            },
            550,
        )
        .await;
        // 70 failed, 50 fits; the failed 70 bounds the refinement and is
        // never encoded again.
        assert_eq!(calls, vec![90, 70, 50, 60, 55]);
        assert_eq!(best.unwrap().size, 550);
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn quality_search_never_repeats_a_quality() {
        for target in [150, 330, 480, 550, 610, 720, 880, 990] {
            let (calls, _, _) = run_quality(
                |k| match k {
                    Knob::Quality(70) | Knob::Quality(30) => None,
                    other => linear(other),
                },
                target,
            )
            .await;
            let mut unique = calls.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), calls.len(), "target {target}: {calls:?}");
        }
    }

    #[tokio::test]
    async fn fps_search_stops_at_first_fit() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("anim.gif");
        std::fs::write(&src, b"gif").unwrap();
        let ws = TrialWorkspace::new(&src).unwrap();
        let enc = Scripted {
            size_for: |k| match k {
                Knob::Fps(f) => Some((f * 100.0) as usize),
                _ => None,
            },
            calls: Mutex::new(Vec::new()),
        };
        let mut runner = TrialRunner::new(&enc, &src, &ws, TrialSelector::new(650, 0.95));
        search_fps(&mut runner, 10).await;

        let calls = enc.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![Knob::Fps(10.0), Knob::Fps(9.0), Knob::Fps(8.0), Knob::Fps(7.0), Knob::Fps(6.0)]
        );
        assert_eq!(runner.into_best().unwrap().size, 600);
    }

    #[tokio::test]
    async fn fps_search_ends_with_half_fps() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("anim.gif");
        std::fs::write(&src, b"gif").unwrap();
        let ws = TrialWorkspace::new(&src).unwrap();
        let enc = Scripted {
            size_for: |_| Some(1_000),
            calls: Mutex::new(Vec::new()),
        };
        let mut runner = TrialRunner::new(&enc, &src, &ws, TrialSelector::new(10, 0.95));
        search_fps(&mut runner, 2).await;

        let calls = enc.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![Knob::Fps(2.0), Knob::Fps(1.0), Knob::Fps(0.5)]);
        assert_eq!(runner.attempts(), 3);
    }
}
