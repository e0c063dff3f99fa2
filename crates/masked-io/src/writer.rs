//! The masking writer.
//!
//! [`MaskedWriter`] wraps any [`std::io::Write`] sink and replaces keyword
//! occurrences with the rule's mask token before the bytes reach the sink.
//! Callers write arbitrary chunks; a keyword split across two `write` calls
//! is still masked because a chunk whose tail could be the start of a keyword
//! is held back until the next write decides it.
//!
//! # Auto-flush
//!
//! Held data must not wait forever when the stream simply stops. By default
//! the first write that holds data arms a short one-shot flush
//! ([`DEFAULT_FLUSH_DELAY`]). Further holds keep that deadline, so a stream
//! that keeps ending in a keyword prefix is still delivered on time. A write
//! or flush that drains the held data disarms it, and a firing never races a
//! write that already consumed the held bytes. The trade-off remains: if the
//! rest of a keyword arrives after the delay has elapsed, the first part has
//! already been forwarded unmasked. Use [`MaskedWriter::disable_auto_flush`]
//! to take over with explicit [`flush`](std::io::Write::flush) calls instead.
//!
//! Dropping a writer flushes whatever it still holds, like
//! [`std::io::BufWriter`].
//!
//! # Example
//!
//! ```rust
//! use std::io::Write;
//! use masked_io::MaskedWriter;
//!
//! let mut writer = MaskedWriter::new(Vec::new());
//! writer.disable_auto_flush();
//! writer.add_keywords(["passw0rd"]);
//!
//! writer.write_all(b"password: pass").unwrap();
//! writer.write_all(b"w0rd").unwrap();
//! writer.flush().unwrap();
//!
//! assert_eq!(writer.into_inner().unwrap(), b"password: *****");
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::BytesMut;

use crate::config::MaskConfig;
use crate::rule::Rule;
use crate::timer::FlushTimer;

/// Default delay before held data is flushed automatically.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_micros(100);

/// A writer that masks keywords before forwarding to an underlying sink.
///
/// `io::Write` is implemented for both `MaskedWriter<W>` and
/// `&MaskedWriter<W>`, so one writer can be shared between threads.
pub struct MaskedWriter<W: Write> {
    // Declared first so the worker is joined before the state is released.
    timer: FlushTimer,
    shared: Arc<Shared<W>>,
}

struct Shared<W> {
    state: Mutex<State<W>>,
    rule: RwLock<Arc<Rule>>,
    auto_flush: AtomicBool,
    flush_delay: Duration,
}

struct State<W> {
    sink: W,
    /// Bytes held back because their tail may begin a keyword.
    pending: BytesMut,
    /// Bumped every time `pending` is drained.
    epoch: u64,
}

/// Write all of `buf`, reporting how many bytes the sink took before failing.
fn write_counted<W: Write + ?Sized>(
    sink: &mut W,
    mut buf: &[u8],
) -> std::result::Result<(), (usize, io::Error)> {
    let mut written = 0;
    while !buf.is_empty() {
        match sink.write(buf) {
            Ok(0) => {
                return Err((
                    written,
                    io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer"),
                ));
            }
            Ok(n) => {
                written += n;
                buf = &buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err((written, e)),
        }
    }
    Ok(())
}

impl<W: Write> Shared<W> {
    fn lock(&self) -> MutexGuard<'_, State<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rule(&self) -> Arc<Rule> {
        Arc::clone(&self.rule.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Timer callback: forward pending data unless a write or flush got there first.
    fn flush_expired(&self, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch || state.pending.is_empty() {
            return;
        }

        let masked = self.rule().mask(&state.pending);
        let State {
            sink,
            pending,
            epoch: current,
        } = &mut *state;
        let outcome = write_counted(&mut *sink, &masked)
            .and_then(|()| sink.flush().map_err(|e| (masked.len(), e)));
        match outcome {
            Ok(()) => {
                tracing::trace!(bytes = pending.len(), "auto-flushed held data");
            }
            Err((0, e)) => {
                // Kept so the next write or flush reports the failure to a caller.
                tracing::warn!(
                    error = %e,
                    held = pending.len(),
                    "auto-flush failed, keeping data pending"
                );
                return;
            }
            Err((written, e)) => {
                tracing::warn!(
                    error = %e,
                    written,
                    held = pending.len(),
                    "auto-flush failed after a partial write, held data dropped"
                );
            }
        }
        pending.clear();
        *current = current.wrapping_add(1);
    }
}

impl<W: Write> MaskedWriter<W> {
    fn write_masked(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        if data.is_empty() && state.pending.is_empty() {
            return Ok(0);
        }

        let held = state.pending.len();
        let mut buf = state.pending.split();
        buf.extend_from_slice(data);

        let Some(masked) = self.shared.rule().mask_if_complete(&buf) else {
            tracing::trace!(held = buf.len(), "holding possible partial keyword");
            state.pending = buf;
            // The deadline runs from the first held byte.
            if !self.timer.is_armed() {
                self.arm(state.epoch);
            }
            return Ok(data.len());
        };

        self.timer.cancel();
        state.epoch = state.epoch.wrapping_add(1);
        if let Err((written, e)) = write_counted(&mut state.sink, &masked) {
            if written == 0 {
                // Only this call's bytes are rejected; earlier held bytes stay queued.
                buf.truncate(held);
                state.pending = buf;
                if held > 0 {
                    self.arm(state.epoch);
                }
            } else {
                // Part of the held data already reached the sink; queuing it
                // again would repeat it.
                tracing::warn!(
                    error = %e,
                    written,
                    held,
                    "sink failed after a partial write, held data dropped"
                );
            }
            return Err(e);
        }

        tracing::trace!(
            input = buf.len(),
            output = masked.len(),
            "forwarded masked data"
        );
        Ok(data.len())
    }

    fn flush_pending(&self) -> io::Result<()> {
        let mut state = self.shared.lock();
        self.timer.cancel();
        state.epoch = state.epoch.wrapping_add(1);

        if !state.pending.is_empty() {
            let buf = state.pending.split();
            let masked = self.shared.rule().mask(&buf);
            tracing::trace!(bytes = buf.len(), "flushing held data");
            state.sink.write_all(&masked)?;
        }
        state.sink.flush()
    }

    fn arm(&self, epoch: u64) {
        if self.shared.auto_flush.load(Ordering::Acquire) {
            self.timer.arm(epoch, self.shared.flush_delay);
        }
    }
}

impl<W> MaskedWriter<W>
where
    W: Write + Send + 'static,
{
    /// Create a writer with a fresh rule and the default mask token.
    pub fn new(sink: W) -> Self {
        Self::with_rule(sink, Arc::new(Rule::new()))
    }

    /// Create a writer bound to an existing, possibly shared, rule.
    pub fn with_rule(sink: W, rule: Arc<Rule>) -> Self {
        Self::from_parts(sink, rule, true, DEFAULT_FLUSH_DELAY)
    }

    /// Create a writer from a configuration.
    pub fn from_config(sink: W, config: &MaskConfig) -> Self {
        Self::from_parts(
            sink,
            Arc::new(config.build_rule()),
            config.auto_flush,
            config.flush_delay(),
        )
    }

    /// Start building a writer.
    pub fn builder(sink: W) -> MaskedWriterBuilder<W> {
        MaskedWriterBuilder::new(sink)
    }

    fn from_parts(sink: W, rule: Arc<Rule>, auto_flush: bool, flush_delay: Duration) -> Self {
        Self::from_shared(Arc::new(Shared {
            state: Mutex::new(State {
                sink,
                pending: BytesMut::new(),
                epoch: 0,
            }),
            rule: RwLock::new(rule),
            auto_flush: AtomicBool::new(auto_flush),
            flush_delay,
        }))
    }

    fn from_shared(shared: Arc<Shared<W>>) -> Self {
        let weak = Arc::downgrade(&shared);
        let timer = FlushTimer::new(move |epoch| {
            if let Some(shared) = weak.upgrade() {
                shared.flush_expired(epoch);
            }
        });

        Self { timer, shared }
    }

    /// Create a writer for another sink that shares this writer's rule.
    ///
    /// Keyword and mask token changes made through either writer apply to
    /// both. Held data is not shared.
    pub fn derive_shared<S>(&self, sink: S) -> MaskedWriter<S>
    where
        S: Write + Send + 'static,
    {
        MaskedWriter::from_parts(
            sink,
            self.rule(),
            self.auto_flush_enabled(),
            self.flush_delay(),
        )
    }

    /// Create a writer for another sink with a copy of this writer's rule.
    ///
    /// Later changes to either rule do not affect the other.
    pub fn derive_independent<S>(&self, sink: S) -> MaskedWriter<S>
    where
        S: Write + Send + 'static,
    {
        MaskedWriter::from_parts(
            sink,
            Arc::new(self.rule().snapshot()),
            self.auto_flush_enabled(),
            self.flush_delay(),
        )
    }

    /// Stop flushing held data automatically.
    ///
    /// Held data then only leaves on the next write that resolves it, on an
    /// explicit flush, or when the writer is dropped.
    pub fn disable_auto_flush(&self) {
        self.shared.auto_flush.store(false, Ordering::Release);
        self.timer.cancel();
    }

    /// Resume flushing held data automatically.
    pub fn enable_auto_flush(&self) {
        self.shared.auto_flush.store(true, Ordering::Release);
    }

    /// Check if auto-flush is enabled.
    #[must_use]
    pub fn auto_flush_enabled(&self) -> bool {
        self.shared.auto_flush.load(Ordering::Acquire)
    }

    /// Get the auto-flush delay.
    #[must_use]
    pub fn flush_delay(&self) -> Duration {
        self.shared.flush_delay
    }

    /// Get the rule this writer masks with.
    #[must_use]
    pub fn rule(&self) -> Arc<Rule> {
        self.shared.rule()
    }

    /// Replace the rule this writer masks with.
    pub fn set_rule(&self, rule: Arc<Rule>) {
        *self
            .shared
            .rule
            .write()
            .unwrap_or_else(PoisonError::into_inner) = rule;
    }

    /// Add keywords to the rule.
    pub fn add_keywords<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule().add_keywords(words);
    }

    /// Remove keywords from the rule.
    pub fn remove_keywords<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rule().remove_keywords(words);
    }

    /// Remove every keyword from the rule.
    pub fn reset_keywords(&self) {
        self.rule().reset_keywords();
    }

    /// Set the rule's mask token.
    pub fn set_mask_token(&self, token: impl Into<String>) {
        self.rule().set_mask_token(token);
    }

    /// Get the number of bytes currently held back.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Access the underlying sink.
    ///
    /// Bytes written directly to the sink bypass masking.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.shared.lock().sink)
    }

    /// Flush held data and return the underlying sink.
    ///
    /// If the flush fails the writer comes back inside the error, so the
    /// sink is not lost. Held data is dropped either way.
    pub fn into_inner(self) -> std::result::Result<W, IntoInnerError<W>> {
        if let Err(e) = self.flush_pending() {
            return Err(IntoInnerError(self, e));
        }

        let shared = Arc::clone(&self.shared);
        // Nothing is held any more, so dropping only stops the worker.
        drop(self);
        Arc::try_unwrap(shared)
            .map(|shared| {
                shared
                    .state
                    .into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .sink
            })
            .map_err(|shared| {
                IntoInnerError(
                    Self::from_shared(shared),
                    io::Error::other("sink is still referenced by the auto-flush worker"),
                )
            })
    }
}

impl<W: Write> Drop for MaskedWriter<W> {
    fn drop(&mut self) {
        if self.shared.lock().pending.is_empty() {
            return;
        }
        if let Err(e) = self.flush_pending() {
            tracing::warn!(error = %e, "failed to flush held data on drop");
        }
    }
}

impl<W> Write for MaskedWriter<W>
where
    W: Write + Send + 'static,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_masked(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pending()
    }
}

impl<W> Write for &MaskedWriter<W>
where
    W: Write + Send + 'static,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_masked(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pending()
    }
}

impl<W> fmt::Debug for MaskedWriter<W>
where
    W: Write,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskedWriter")
            .field("rule", &self.shared.rule())
            .field("pending", &self.shared.lock().pending.len())
            .field("auto_flush", &self.shared.auto_flush.load(Ordering::Relaxed))
            .field("flush_delay", &self.shared.flush_delay)
            .field("timer_armed", &self.timer.is_armed())
            .finish()
    }
}

/// Error returned by [`MaskedWriter::into_inner`] when held data could not
/// be flushed.
///
/// Carries the writer, and with it the sink.
pub struct IntoInnerError<W: Write>(MaskedWriter<W>, io::Error);

impl<W: Write> IntoInnerError<W> {
    /// Get the error that stopped the flush.
    #[must_use]
    pub const fn error(&self) -> &io::Error {
        &self.1
    }

    /// Take back the writer.
    #[must_use]
    pub fn into_inner(self) -> MaskedWriter<W> {
        self.0
    }

    /// Take the error, dropping the writer.
    #[must_use]
    pub fn into_error(self) -> io::Error {
        self.1
    }

    /// Split into the error and the writer.
    #[must_use]
    pub fn into_parts(self) -> (io::Error, MaskedWriter<W>) {
        (self.1, self.0)
    }
}

impl<W: Write> fmt::Debug for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoInnerError")
            .field(&self.0)
            .field(&self.1)
            .finish()
    }
}

impl<W: Write> fmt::Display for IntoInnerError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to flush held data: {}", self.1)
    }
}

impl<W: Write> std::error::Error for IntoInnerError<W> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.1)
    }
}

impl<W: Write> From<IntoInnerError<W>> for io::Error {
    fn from(err: IntoInnerError<W>) -> Self {
        err.into_error()
    }
}

/// Builder for [`MaskedWriter`].
#[derive(Debug)]
pub struct MaskedWriterBuilder<W> {
    sink: W,
    rule: Option<Arc<Rule>>,
    keywords: Vec<String>,
    mask_token: Option<String>,
    auto_flush: bool,
    flush_delay: Duration,
}

impl<W> MaskedWriterBuilder<W>
where
    W: Write + Send + 'static,
{
    /// Create a new builder for the given sink.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            rule: None,
            keywords: Vec::new(),
            mask_token: None,
            auto_flush: true,
            flush_delay: DEFAULT_FLUSH_DELAY,
        }
    }

    /// Use an existing rule.
    ///
    /// Keywords and a mask token given to this builder are applied to that
    /// rule, and so become visible to every writer sharing it.
    #[must_use]
    pub fn rule(mut self, rule: Arc<Rule>) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Add keywords to mask.
    #[must_use]
    pub fn keywords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(words.into_iter().map(Into::into));
        self
    }

    /// Set the mask token.
    #[must_use]
    pub fn mask_token(mut self, token: impl Into<String>) -> Self {
        self.mask_token = Some(token.into());
        self
    }

    /// Enable or disable auto-flush.
    #[must_use]
    pub const fn auto_flush(mut self, enabled: bool) -> Self {
        self.auto_flush = enabled;
        self
    }

    /// Set the auto-flush delay.
    #[must_use]
    pub const fn flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Build the writer.
    pub fn build(self) -> MaskedWriter<W> {
        let rule = self.rule.unwrap_or_else(|| Arc::new(Rule::new()));
        if let Some(token) = self.mask_token {
            rule.set_mask_token(token);
        }
        if !self.keywords.is_empty() {
            rule.add_keywords(self.keywords);
        }
        MaskedWriter::from_parts(self.sink, rule, self.auto_flush, self.flush_delay)
    }
}
