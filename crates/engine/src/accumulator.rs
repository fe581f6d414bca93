use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use betrace_common::span::Span;

/// Buffered spans of one trace id awaiting trace-scoped evaluation. Spans
/// stay ordered by start timestamp; the span-id index is built when the
/// context is finalized for evaluation.
#[derive(Debug, Clone)]
pub struct TraceContext {
    trace_id: String,
    spans: Vec<Span>,
    index: HashMap<String, usize>,
    last_activity_ns: i64,
    evicted: bool,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            spans: Vec::new(),
            index: HashMap::new(),
            last_activity_ns: 0,
            evicted: false,
        }
    }

    pub fn push(&mut self, span: Span) {
        let pos = self.spans.partition_point(|s| s.start_ns <= span.start_ns);
        self.spans.insert(pos, span);
    }

    pub fn finalize(&mut self) {
        self.index = self
            .spans
            .iter()
            .enumerate()
            .map(|(i, s)| (s.span_id.clone(), i))
            .collect();
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// True when this context was restarted after its predecessor closed;
    /// firings against it may be incomplete.
    pub fn evicted(&self) -> bool {
        self.evicted
    }

    pub fn position_of(&self, span_id: &str) -> Option<usize> {
        self.index.get(span_id).copied()
    }
}

#[derive(Debug)]
pub enum Appended {
    Buffered,
    /// The per-trace span cap was reached; the context is closed and ready
    /// for evaluation.
    Closed(TraceContext),
}

/// Sharded buffer of open trace contexts. Contexts close on the span cap,
/// the idle window, or an explicit flush; closed traces are remembered for a
/// while so a late span restarts its context with the evicted marker set.
#[derive(Debug)]
pub struct TraceAccumulator {
    traces: DashMap<String, TraceContext>,
    recently_closed: DashMap<String, i64>,
    max_spans_per_trace: usize,
    window_ns: i64,
    max_traces: usize,
    evictions: AtomicU64,
}

impl TraceAccumulator {
    pub fn new(max_spans_per_trace: usize, window_ns: i64, max_traces: usize) -> Self {
        Self {
            traces: DashMap::new(),
            recently_closed: DashMap::new(),
            max_spans_per_trace,
            window_ns,
            max_traces,
            evictions: AtomicU64::new(0),
        }
    }

    pub fn append(&self, span: Span, now_ns: i64) -> Appended {
        let trace_id = span.trace_id.clone();
        let full = {
            let mut entry = self.traces.entry(trace_id.clone()).or_insert_with(|| {
                let mut ctx = TraceContext::new(trace_id.clone());
                ctx.evicted = self.recently_closed.contains_key(&trace_id);
                ctx
            });
            entry.push(span);
            entry.last_activity_ns = now_ns;
            entry.len() >= self.max_spans_per_trace
        };

        if full {
            if let Some((_, mut ctx)) = self.traces.remove(&trace_id) {
                self.recently_closed.insert(trace_id, now_ns);
                ctx.finalize();
                return Appended::Closed(ctx);
            }
        } else if self.traces.len() > self.max_traces {
            self.evict_oldest(now_ns);
        }
        Appended::Buffered
    }

    /// Closes every context idle past the window and prunes the
    /// recently-closed set. Called periodically by the engine.
    pub fn sweep(&self, now_ns: i64) -> Vec<TraceContext> {
        let idle: Vec<String> = self
            .traces
            .iter()
            .filter(|e| now_ns.saturating_sub(e.last_activity_ns) >= self.window_ns)
            .map(|e| e.key().clone())
            .collect();

        let mut closed = Vec::new();
        for id in idle {
            if let Some((_, mut ctx)) = self.traces.remove(&id) {
                self.recently_closed.insert(id, now_ns);
                ctx.finalize();
                closed.push(ctx);
            }
        }

        self.recently_closed
            .retain(|_, closed_at| now_ns.saturating_sub(*closed_at) < self.window_ns * 2);

        closed.sort_by(|a, b| a.trace_id.cmp(&b.trace_id));
        closed
    }

    pub fn flush(&self, trace_id: &str, now_ns: i64) -> Option<TraceContext> {
        let (_, mut ctx) = self.traces.remove(trace_id)?;
        self.recently_closed.insert(trace_id.to_string(), now_ns);
        ctx.finalize();
        Some(ctx)
    }

    pub fn flush_all(&self, now_ns: i64) -> Vec<TraceContext> {
        let ids: Vec<String> = self.traces.iter().map(|e| e.key().clone()).collect();
        let mut out: Vec<TraceContext> = ids
            .into_iter()
            .filter_map(|id| self.flush(&id, now_ns))
            .collect();
        out.sort_by(|a, b| a.trace_id.cmp(&b.trace_id));
        out
    }

    /// Drops the least recently active context. Evicted traces never
    /// produce violations; they only show up in the eviction counter.
    fn evict_oldest(&self, now_ns: i64) {
        let oldest = self
            .traces
            .iter()
            .min_by_key(|e| e.last_activity_ns)
            .map(|e| e.key().clone());
        if let Some(id) = oldest {
            if self.traces.remove(&id).is_some() {
                self.recently_closed.insert(id, now_ns);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn open_traces(&self) -> usize {
        self.traces.len()
    }
}
