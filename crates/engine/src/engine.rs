use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};

use betrace_common::span::Span;
use betrace_common::time::{now_unix_ms, now_unix_ns};
use betrace_common::violation::Violation;

use crate::accumulator::{Appended, TraceAccumulator, TraceContext};
use crate::config::EngineConfig;
use crate::eval::{ClauseFiring, Decision, EvalError, EvalInput, Evaluator};
use crate::quarantine::Quarantine;
use crate::rules::CompiledRule;
use crate::stats::EngineStats;
use crate::table::ActiveRules;

struct IngestJob {
    span: Span,
    ingested_at_ns: i64,
}

/// The evaluation pipeline: a bounded ingest queue feeding a worker pool,
/// the copy-on-write rule table, the trace accumulator, and the violation
/// fan-in channel. Mutations of the rule set go through the lifecycle FSM,
/// never through this type directly.
pub struct Engine {
    config: EngineConfig,
    rules: ActiveRules,
    stats: EngineStats,
    quarantine: Quarantine,
    accumulator: TraceAccumulator,
    evaluator: Evaluator,
    ingest_tx: mpsc::Sender<IngestJob>,
    violations_tx: mpsc::Sender<Violation>,
}

impl Engine {
    /// Spawns the worker pool and the accumulator sweep task. The returned
    /// receiver carries every violation the engine produces; hand it to the
    /// export batcher.
    pub fn start(config: EngineConfig) -> (Arc<Self>, mpsc::Receiver<Violation>) {
        let queue_depth = config.ingest_queue.max(1);
        let (ingest_tx, ingest_rx) = mpsc::channel(queue_depth);
        let (violations_tx, violations_rx) = mpsc::channel(queue_depth);

        let engine = Arc::new(Self {
            rules: ActiveRules::new(),
            stats: EngineStats::new(),
            quarantine: Quarantine::new(
                config.error_budget,
                config.error_window.as_millis() as i64,
            ),
            accumulator: TraceAccumulator::new(
                config.trace_max_spans,
                config.trace_window.as_nanos() as i64,
                config.max_traces,
            ),
            evaluator: Evaluator::new(config.trace_max_spans),
            ingest_tx,
            violations_tx,
            config,
        });

        let shared_rx = Arc::new(Mutex::new(ingest_rx));
        for _ in 0..engine.config.worker_count() {
            tokio::spawn(worker_loop(engine.clone(), shared_rx.clone()));
        }
        tokio::spawn(sweep_loop(engine.clone()));

        (engine, violations_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Non-blocking ingest: waits at most `ingest_block` for queue space,
    /// then drops the span and counts the loss.
    pub async fn submit(&self, span: Span, ingested_at_ns: i64) -> bool {
        self.stats.inc_submitted();
        let job = IngestJob {
            span,
            ingested_at_ns,
        };
        match self
            .ingest_tx
            .send_timeout(job, self.config.ingest_block)
            .await
        {
            Ok(()) => true,
            Err(_) => {
                self.stats.inc_dropped();
                false
            }
        }
    }

    /// Atomic insert-or-replace. In-flight evaluations keep the snapshot
    /// they started with.
    pub fn load_or_replace(&self, rule: Arc<CompiledRule>) {
        self.rules.load_or_replace(rule);
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.rules.delete(id);
        if removed {
            self.stats.remove_rule(id);
            self.quarantine.clear(id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledRule>> {
        self.rules.get(id)
    }

    /// Consistent view of the active set, ordered by creation time then id
    /// so listings are stable.
    pub fn snapshot(&self) -> Vec<Arc<CompiledRule>> {
        let mut rules: Vec<Arc<CompiledRule>> = self.rules.snapshot().values().cloned().collect();
        rules.sort_by(|a, b| {
            (a.record.created_at_ms, a.id()).cmp(&(b.record.created_at_ms, b.id()))
        });
        rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn evicted_traces(&self) -> u64 {
        self.accumulator.evictions()
    }

    pub fn is_quarantined(&self, id: &str) -> bool {
        self.quarantine.is_quarantined(id)
    }

    pub fn clear_quarantine(&self, id: &str) {
        self.quarantine.clear(id);
    }

    /// Runs every active span-scoped rule against one span. Used by the
    /// ingest workers and by the synchronous debug endpoint.
    pub fn evaluate_span(&self, span: &Span, fired_at_ns: i64) -> Vec<Violation> {
        let mut out = Vec::new();
        for rule in self.active_rules(false) {
            let input = EvalInput {
                span,
                trace: None,
                deadline: Some(Instant::now() + self.config.eval_timeout),
            };
            self.run_rule(&rule, &input, span, fired_at_ns, false, &mut out);
        }
        out
    }

    /// Runs every active trace-scoped rule against each span of a closed
    /// trace context.
    pub fn evaluate_trace(&self, ctx: &TraceContext, fired_at_ns: i64) -> Vec<Violation> {
        let mut out = Vec::new();
        for rule in self.active_rules(true) {
            for span in ctx.spans() {
                let input = EvalInput {
                    span,
                    trace: Some(ctx),
                    deadline: Some(Instant::now() + self.config.eval_timeout),
                };
                self.run_rule(&rule, &input, span, fired_at_ns, ctx.evicted(), &mut out);
            }
        }
        out
    }

    /// Operator flush: close and evaluate every open trace context now.
    pub async fn flush_traces(&self) -> usize {
        let now = now_unix_ns();
        let contexts = self.accumulator.flush_all(now);
        let count = contexts.len();
        for ctx in contexts {
            let violations = self.evaluate_trace(&ctx, now);
            self.emit(violations).await;
        }
        count
    }

    fn active_rules(&self, trace_scoped: bool) -> Vec<Arc<CompiledRule>> {
        let snap = self.rules.snapshot();
        let mut rules: Vec<Arc<CompiledRule>> = snap
            .values()
            .filter(|r| {
                r.trace_scoped == trace_scoped
                    && r.active()
                    && !self.quarantine.is_quarantined(r.id())
            })
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.id().cmp(b.id()));
        rules
    }

    fn has_active_trace_rules(&self) -> bool {
        self.rules
            .snapshot()
            .values()
            .any(|r| r.trace_scoped && r.active() && !self.quarantine.is_quarantined(r.id()))
    }

    fn run_rule(
        &self,
        rule: &CompiledRule,
        input: &EvalInput,
        span: &Span,
        fired_at_ns: i64,
        evicted: bool,
        out: &mut Vec<Violation>,
    ) {
        self.stats.inc_evaluations(rule.id());
        match self.evaluator.evaluate(rule, input) {
            Decision::Match(firings) => {
                self.stats.inc_firings(rule.id());
                out.push(self.build_violation(rule, span, firings, fired_at_ns, evicted));
            }
            Decision::NoMatch => {}
            Decision::Error(e) => self.record_eval_error(rule.id(), &e),
        }
    }

    fn build_violation(
        &self,
        rule: &CompiledRule,
        span: &Span,
        firings: Vec<ClauseFiring>,
        fired_at_ns: i64,
        evicted: bool,
    ) -> Violation {
        let clauses: Vec<&str> = firings.iter().map(|f| f.clause.as_str()).collect();
        let message = format!("assertion failed: {}", clauses.join(", "));
        let mut metadata: Vec<(String, String)> =
            firings.into_iter().map(|f| (f.clause, f.detail)).collect();
        if evicted {
            metadata.push(("evicted".to_string(), "true".to_string()));
        }

        let mut violation = Violation {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id().to_string(),
            rule_name: rule.record.name.clone(),
            severity: rule.record.severity,
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            fired_at_ns,
            message,
            metadata,
            signature: None,
        };
        if let Some(secret) = &self.config.signing_secret {
            violation.sign(secret);
        }
        self.stats.inc_violations();
        violation
    }

    /// Evaluation errors never reach the ingest path; they are counted per
    /// rule, logged on a budgeted cadence, and eventually quarantine the
    /// rule.
    fn record_eval_error(&self, rule_id: &str, err: &EvalError) {
        self.stats.inc_errors(rule_id);
        let errors = self.stats.rule(rule_id).errors;
        if errors <= 3 || errors % 100 == 0 {
            tracing::warn!(rule_id = %rule_id, error = %err, errors, "rule evaluation error");
        }
        if self.quarantine.record_error(rule_id, now_unix_ms()) {
            tracing::warn!(rule_id = %rule_id, "error budget exhausted, rule quarantined");
        }
    }

    async fn handle(&self, job: IngestJob) {
        let mut violations = self.evaluate_span(&job.span, job.ingested_at_ns);
        if self.has_active_trace_rules() {
            if let Appended::Closed(ctx) = self.accumulator.append(job.span, job.ingested_at_ns) {
                violations.extend(self.evaluate_trace(&ctx, job.ingested_at_ns));
            }
        }
        self.emit(violations).await;
    }

    async fn emit(&self, violations: Vec<Violation>) {
        for violation in violations {
            if self.violations_tx.send(violation).await.is_err() {
                tracing::error!("violation channel closed, record lost");
                return;
            }
        }
    }

    /// Closes idle trace contexts and evaluates them. Returns the produced
    /// violations; the caller emits them.
    fn sweep(&self, now_ns: i64) -> Vec<Violation> {
        self.accumulator
            .sweep(now_ns)
            .into_iter()
            .flat_map(|ctx| self.evaluate_trace(&ctx, now_ns))
            .collect()
    }
}

async fn worker_loop(engine: Arc<Engine>, rx: Arc<Mutex<mpsc::Receiver<IngestJob>>>) {
    loop {
        let job = { rx.lock().await.recv().await };
        match job {
            Some(job) => engine.handle(job).await,
            None => return,
        }
    }
}

async fn sweep_loop(engine: Arc<Engine>) {
    let mut ticker = tokio::time::interval(engine.config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let violations = engine.sweep(now_unix_ns());
        engine.emit(violations).await;
    }
}
