//! Signal engine
//!
//! Ties the detectors, the combiner and the lifecycle cache together behind
//! one handle. `analyze` is pure. `generate_signals` analyzes and commits the
//! result to the cache. `tick` feeds prices to the completion evaluator.

use crate::config::EngineConfig;
use crate::error::{EngineError, Rejection};
use crate::feed::MarketData;
use crate::lifecycle::{
    spawn_statistics, ActiveSignal, CompletionRecord, SignalCache, StatisticsReport,
};
use crate::signals::{Combiner, Signal};
use crate::strategies::{
    AnalysisContext, BreakoutRetestDetector, Candidate, Detector, LiquiditySweepDetector,
};
use crate::types::InstrumentSeries;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

pub struct SignalEngine {
    config: EngineConfig,
    detectors: Vec<Box<dyn Detector>>,
    combiner: Combiner,
    cache: SignalCache,
}

impl SignalEngine {
    /// Build the engine and start its statistics task. Must be called inside
    /// a tokio runtime.
    pub fn new(config: EngineConfig) -> Self {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(BreakoutRetestDetector::new(config.breakout_retest.clone())),
            Box::new(LiquiditySweepDetector::new(config.liquidity_sweep.clone())),
        ];
        let stats = spawn_statistics(config.cache.history_limit);
        let cache = SignalCache::new(config.cache.clone(), stats);

        Self {
            combiner: Combiner::new(config.combiner.clone()),
            detectors,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every detector, keeping the candidates and logging rejections
    pub fn candidates(&self, ctx: &AnalysisContext<'_>) -> Vec<Candidate> {
        self.detectors
            .iter()
            .filter_map(|detector| match detector.analyze(ctx) {
                Ok(candidate) => {
                    debug!(
                        "{} {} candidate {} score {:.1} rr {:.2}",
                        ctx.instrument,
                        detector.strategy(),
                        candidate.direction,
                        candidate.score,
                        candidate.reward_risk()
                    );
                    Some(candidate)
                }
                Err(rejection) => {
                    debug!("{} {} rejected: {}", ctx.instrument, detector.strategy(), rejection);
                    None
                }
            })
            .collect()
    }

    /// Analyze without touching the cache. The signal is stamped with the
    /// time of the latest bar.
    pub fn analyze(
        &self,
        instrument: &str,
        series: &InstrumentSeries,
        confirmation: Option<&InstrumentSeries>,
    ) -> Result<Signal, Rejection> {
        let mut ctx = AnalysisContext::new(series, confirmation)?;
        ctx.instrument = instrument;
        let created_at = series.last().map_or_else(Utc::now, |b| b.timestamp);
        let candidates = self.candidates(&ctx);
        self.combiner.evaluate(&candidates, created_at)
    }

    /// Analyze and commit. Returns `Ok(None)` when the instrument already has
    /// an active signal or nothing qualified. Concurrent callers for one
    /// instrument race on the worker; the losers get `Ok(None)`.
    pub async fn generate_signals(
        &self,
        instrument: &str,
        series: &InstrumentSeries,
        confirmation: Option<&InstrumentSeries>,
    ) -> Result<Option<Signal>, EngineError> {
        if let Some(active) = self.cache.snapshot(instrument).await? {
            debug!("{} already has active signal {}, skipping analysis", instrument, active.signal.id());
            return Ok(None);
        }

        let signal = match self.analyze(instrument, series, confirmation) {
            Ok(signal) => signal,
            Err(rejection) => {
                debug!("{} no signal: {}", instrument, rejection);
                return Ok(None);
            }
        };

        if self.cache.submit_if_vacant(signal.clone()).await? {
            Ok(Some(signal))
        } else {
            debug!("{} signal {} lost to a concurrent submission", instrument, signal.id());
            Ok(None)
        }
    }

    pub async fn tick(&self, instrument: &str, price: f64) -> Result<Option<CompletionRecord>, EngineError> {
        self.tick_at(instrument, price, Utc::now()).await
    }

    /// Observe a price stamped with an explicit time (replay)
    pub async fn tick_at(
        &self,
        instrument: &str,
        price: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<CompletionRecord>, EngineError> {
        if !price.is_finite() || price <= 0.0 {
            warn!("{} ignoring invalid price {}", instrument, price);
            return Ok(None);
        }
        self.cache.observe(instrument, price, observed_at).await
    }

    /// Walk `primary` bar by bar: tick the close, then generate on the history
    /// up to and including that bar, with confirmation bars stamped no later.
    /// Both histories grow in place. Returns the number of signals generated.
    pub async fn replay(
        &self,
        primary: &InstrumentSeries,
        confirmation: Option<&InstrumentSeries>,
        warmup: usize,
    ) -> Result<usize, EngineError> {
        let instrument = primary.instrument.as_str();
        let bars = primary.bars();
        let start = warmup.min(bars.len());

        let mut history = InstrumentSeries::from_bars(instrument, primary.timeframe, bars[..start].to_vec());
        let mut confirm = confirmation.map(|s| InstrumentSeries::new(&s.instrument, s.timeframe));
        let mut next_confirm = 0;
        let mut generated = 0;

        for bar in &bars[start..] {
            history.push(*bar);
            if let (Some(source), Some(confirm)) = (confirmation, confirm.as_mut()) {
                while let Some(b) = source.bars().get(next_confirm) {
                    if b.timestamp > bar.timestamp {
                        break;
                    }
                    confirm.push(*b);
                    next_confirm += 1;
                }
            }

            self.tick_at(instrument, bar.close, bar.timestamp).await?;
            if self.generate_signals(instrument, &history, confirm.as_ref()).await?.is_some() {
                generated += 1;
            }
        }

        Ok(generated)
    }

    pub async fn list_active_signals(&self) -> Vec<Signal> {
        self.cache
            .snapshots()
            .await
            .into_iter()
            .map(|active| active.signal)
            .collect()
    }

    /// Active signals with their last observed price
    pub async fn active_snapshots(&self) -> Vec<ActiveSignal> {
        self.cache.snapshots().await
    }

    /// Global figures for `None`, per-instrument figures otherwise
    pub async fn get_statistics(&self, instrument: Option<&str>) -> Result<StatisticsReport, EngineError> {
        self.cache.stats().query(instrument).await
    }

    pub async fn recent_completions(&self, n: usize) -> Result<Vec<CompletionRecord>, EngineError> {
        self.cache.stats().recent(n).await
    }

    /// Fetch bars from `provider` and generate. Provider failures skip the
    /// cycle.
    pub async fn run_cycle(&self, provider: &dyn MarketData, instrument: &str) -> Result<Option<Signal>, EngineError> {
        let series = match provider
            .get_bars(instrument, self.config.primary_timeframe, self.config.bar_count)
            .await
        {
            Ok(series) => series,
            Err(e) => {
                warn!("{} bars unavailable, skipping cycle: {:#}", instrument, e);
                return Ok(None);
            }
        };

        let confirmation = match self.config.confirmation_timeframe {
            Some(tf) => match provider.get_bars(instrument, tf, self.config.bar_count).await {
                Ok(series) => Some(series),
                Err(e) => {
                    warn!("{} {} confirmation bars unavailable: {:#}", instrument, tf, e);
                    None
                }
            },
            None => None,
        };

        self.generate_signals(instrument, &series, confirmation.as_ref()).await
    }

    /// Fetch a live price for each instrument and tick it
    pub async fn poll_prices(
        &self,
        provider: &dyn MarketData,
        instruments: &[String],
    ) -> Result<Vec<CompletionRecord>, EngineError> {
        let mut completed = Vec::new();
        for instrument in instruments {
            match provider.get_live_price(instrument).await {
                Ok(price) => {
                    if let Some(record) = self.tick(instrument, price).await? {
                        completed.push(record);
                    }
                }
                Err(e) => warn!("{} live price unavailable: {:#}", instrument, e),
            }
        }
        if !completed.is_empty() {
            info!("{} signal(s) completed this poll", completed.len());
        }
        Ok(completed)
    }
}
