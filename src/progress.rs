//! Nestable progress reporting.
//!
//! A task covers a span of its parent's range. Reporters see fractions and
//! labels already composed through every open task, so the pipeline, the
//! download stage and a single transfer can each report in their own 0..1
//! range.

use parking_lot::Mutex;
use tracing::debug;

/// Receiver of progress updates. Calls are synchronous and must not block.
pub trait Progress: Send + Sync {
    /// Opens a sub-task covering `span` of the current range, starting at `start`.
    /// `template` may contain `{}`, replaced by the labels of later updates.
    fn start_task(&self, start: f64, span: f64, template: &str);

    /// Reports progress within the innermost open task.
    fn update(&self, fraction: f64, label: &str);

    /// Closes the innermost task.
    fn finish_task(&self);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start_task(&self, _start: f64, _span: f64, _template: &str) {}
    fn update(&self, _fraction: f64, _label: &str) {}
    fn finish_task(&self) {}
}

#[derive(Debug, Clone)]
struct Frame {
    offset: f64,
    span: f64,
    template: String,
}

/// Stack of open tasks, turning local fractions into absolute ones.
#[derive(Debug, Default)]
pub struct TaskStack {
    frames: Vec<Frame>,
}

impl TaskStack {
    fn current(&self) -> (f64, f64) {
        self.frames
            .last()
            .map(|f| (f.offset, f.span))
            .unwrap_or((0.0, 1.0))
    }

    pub fn push(&mut self, start: f64, span: f64, template: &str) {
        let (offset, parent_span) = self.current();
        self.frames.push(Frame {
            offset: offset + start.clamp(0.0, 1.0) * parent_span,
            span: span.clamp(0.0, 1.0) * parent_span,
            template: template.to_string(),
        });
    }

    pub fn pop(&mut self) -> Option<f64> {
        self.frames.pop().map(|f| f.offset + f.span)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Absolute fraction for a local fraction of the innermost task.
    pub fn absolute(&self, fraction: f64) -> f64 {
        let (offset, span) = self.current();
        (offset + fraction.clamp(0.0, 1.0) * span).clamp(0.0, 1.0)
    }

    /// Label with every open template applied, innermost first.
    pub fn label(&self, label: &str) -> String {
        self.frames.iter().rev().fold(label.to_string(), |inner, frame| {
            if frame.template.is_empty() {
                inner
            } else if frame.template.contains("{}") {
                frame.template.replace("{}", &inner)
            } else {
                frame.template.clone()
            }
        })
    }
}

/// Writes composed progress to the debug log.
#[derive(Debug, Default)]
pub struct LogProgress {
    stack: Mutex<TaskStack>,
}

impl Progress for LogProgress {
    fn start_task(&self, start: f64, span: f64, template: &str) {
        self.stack.lock().push(start, span, template);
    }

    fn update(&self, fraction: f64, label: &str) {
        let stack = self.stack.lock();
        debug!(
            "[{:>5.1}%] {}",
            stack.absolute(fraction) * 100.0,
            stack.label(label)
        );
    }

    fn finish_task(&self) {
        self.stack.lock().pop();
    }
}

const BAR_RESOLUTION: u64 = 1000;

/// Drives an `indicatif` bar from composed progress.
pub struct BarProgress {
    bar: indicatif::ProgressBar,
    stack: Mutex<TaskStack>,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = indicatif::ProgressBar::new(BAR_RESOLUTION);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {percent:>3}% {msg} | {elapsed_precise} elapsed")
        {
            bar.set_style(style.progress_chars("█▓▒░ "));
        }
        Self {
            bar,
            stack: Mutex::new(TaskStack::default()),
        }
    }

    pub fn finish_with_message(&self, message: impl Into<std::borrow::Cow<'static, str>>) {
        self.bar.finish_with_message(message);
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn start_task(&self, start: f64, span: f64, template: &str) {
        let mut stack = self.stack.lock();
        stack.push(start, span, template);
        self.bar
            .set_position((stack.absolute(0.0) * BAR_RESOLUTION as f64) as u64);
    }

    fn update(&self, fraction: f64, label: &str) {
        let stack = self.stack.lock();
        self.bar
            .set_position((stack.absolute(fraction) * BAR_RESOLUTION as f64) as u64);
        self.bar.set_message(stack.label(label));
    }

    fn finish_task(&self) {
        let mut stack = self.stack.lock();
        if let Some(end) = stack.pop() {
            self.bar.set_position((end * BAR_RESOLUTION as f64) as u64);
        }
    }
}
