use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Maximum number of log entries to keep in memory
const MAX_LOG_ENTRIES: usize = 1000;

/// A log entry with timestamp and message
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: Level, target: &str, message: String) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S.%3f").to_string(),
            level: level.to_string().to_uppercase(),
            target: target.to_string(),
            message,
        }
    }

    /// Format for the diagnostic console
    pub fn format_for_display(&self) -> String {
        format!(
            "[{}] {} [{}] {}",
            self.timestamp, self.level, self.target, self.message
        )
    }
}

/// Thread-safe ring buffer for log entries
#[derive(Clone, Default)]
pub struct LogRingBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogRingBuffer {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES))),
        }
    }

    pub fn push(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= MAX_LOG_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    pub fn get_recent(&self, count: usize) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().rev().take(count).rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Custom writer that captures logs to our ring buffer
#[derive(Clone)]
pub struct RingBufferWriter {
    buffer: LogRingBuffer,
}

impl RingBufferWriter {
    pub fn new(buffer: LogRingBuffer) -> Self {
        Self { buffer }
    }
}

const LEVEL_PREFIXES: [(&str, Level); 5] = [
    ("TRACE ", Level::TRACE),
    ("DEBUG ", Level::DEBUG),
    ("INFO ", Level::INFO),
    ("WARN ", Level::WARN),
    ("ERROR ", Level::ERROR),
];

/// Split a compact-format line ("LEVEL target: message") into an entry
fn parse_line(line: &str) -> LogEntry {
    let parsed = LEVEL_PREFIXES
        .iter()
        .find_map(|(prefix, level)| line.strip_prefix(*prefix).map(|rest| (*level, rest.trim_start())));

    let (level, rest) = match parsed {
        Some(parsed) => parsed,
        None => return LogEntry::new(Level::INFO, "general", line.to_string()),
    };

    match rest.split_once(':') {
        Some((target, msg)) if !target.contains(' ') => {
            LogEntry::new(level, target, msg.trim().to_string())
        }
        _ => LogEntry::new(level, "general", rest.to_string()),
    }
}

impl std::io::Write for RingBufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(message) = std::str::from_utf8(buf) {
            let message = message.trim();
            if !message.is_empty() {
                self.buffer.push(parse_line(message));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RingBufferWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Global log buffer accessible throughout the application
static LOG_BUFFER: OnceLock<LogRingBuffer> = OnceLock::new();

/// Initialize tracing: everything goes to the ring buffer, optionally echoed to stderr
pub fn init_tracing(echo_stderr: bool) -> LogRingBuffer {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let buffer = LOG_BUFFER.get_or_init(LogRingBuffer::new).clone();

    let ring_layer = fmt::layer()
        .with_writer(RingBufferWriter::new(buffer.clone()))
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .without_time()
        .compact();

    let stderr_layer = echo_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("status_tables=debug,api=debug,render=debug,images=debug,presets=debug,notes=debug,warn"));

    // A second init (tests, repeated runs) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(ring_layer)
        .with(stderr_layer)
        .try_init();

    tracing::info!(target: "status_tables", "Tracing initialized");

    buffer
}
