//! Fixed constants of the dialing and voice pipeline

/// Audio framing
pub mod audio {
    /// Outbound gateway frame size: 100 ms at 8 kHz / 16-bit mono
    pub const OUTBOUND_FRAME_BYTES: usize = 3200;
    /// Flushed payloads are zero-padded to this boundary (20 ms)
    pub const FRAME_PAD_BOUNDARY: usize = 320;
    /// Telephony leg sample rate
    pub const SAMPLE_RATE_HZ: u32 = 8000;
}

/// Turn-loop timing
pub mod turn {
    /// Debounce after the last final transcript fragment before finalizing
    pub const END_OF_SPEECH_DEBOUNCE_MS: u64 = 1000;
    /// Hard cap on continuous user speech before forced processing
    pub const MAX_UTTERANCE_MS: u64 = 8000;
    /// Silence window used by the batch-VAD fallback
    pub const BATCH_SILENCE_WINDOW_MS: u64 = 150;
    /// Echo-suppression window after the assistant finishes speaking
    pub const COOLDOWN_MS: u64 = 1500;
    /// Minimum partial length (words) before the speculative LLM launch
    pub const EARLY_LLM_MIN_WORDS: usize = 3;
    /// Minimum sentence length (chars) before a chunk is sent to TTS
    pub const MIN_SENTENCE_CHARS: usize = 10;
}

/// Concurrency control plane
pub mod slots {
    /// Pre-dial lease TTL; reclaims slots whose dial never happened
    pub const PRE_DIAL_TTL_SECS: u64 = 60;
    /// Promote-mutex TTL
    pub const PROMOTE_MUTEX_TTL_SECS: u64 = 10;
    /// Every N-th pop reads the normal tier when fairness is on
    pub const FAIR_ROTATION_N: u64 = 4;
    /// Reducing the limit below this fraction of active is rejected
    pub const SATURATION_FRACTION: f64 = 0.9;
}

/// STT connection pool
pub mod pool {
    /// Provider hard ceiling on concurrent streaming connections
    pub const MAX_CONNECTIONS: usize = 20;
    /// Queued acquire requests beyond this are rejected outright
    pub const MAX_QUEUED: usize = 50;
    /// Queued acquires give up after this long
    pub const ACQUIRE_TIMEOUT_SECS: u64 = 30;
}

/// Language switching thresholds
pub mod language {
    /// First utterance switches at this detection confidence
    pub const FIRST_UTTERANCE_CONFIDENCE: f32 = 0.70;
    /// Later utterances switch only above this confidence
    pub const SUBSEQUENT_CONFIDENCE: f32 = 0.85;
}

/// Retrieval gating and formatting
pub mod rag {
    pub const TOP_K: usize = 3;
    pub const MIN_SCORE: f32 = 0.7;
    pub const MAX_CONTEXT_CHARS: usize = 2000;
    /// Utterances at or below this many words skip retrieval
    pub const MIN_QUERY_WORDS: usize = 3;
}

/// Reconciliation cadence
pub mod reconcile {
    pub const WAITLIST_SCAN_INTERVAL_SECS: u64 = 300;
    pub const WAITLIST_SCAN_BATCH: usize = 500;
    /// Active calls older than this are presumed leaked
    pub const MAX_CALL_AGE_SECS: u64 = 7200;
    /// Purge waits this long after pausing before force-releasing
    pub const PURGE_GRACE_SECS: u64 = 3;
}

/// Dial pacing
pub mod pacing {
    /// Delay between dials in a batch after a concurrency denial
    pub const INTER_CALL_DELAY_MS: u64 = 1000;
    /// Exponential backoff ceiling
    pub const MAX_BACKOFF_MS: u64 = 5000;
}
