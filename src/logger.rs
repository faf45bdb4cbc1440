use std::fs::{File, create_dir_all};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Log event types that determine which receivers should log the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    /// Every accepted bid as a CSV row (only produced with --verbose bids)
    Bid,
    /// Per-pass data of one matching run
    Iteration,
    /// Convergence information (pass counts, iteration cap, generator fallbacks)
    Convergence,
    /// Experiment-level results (sweep points, aggregated means)
    Experiment,
    /// Scenario-level data (comparisons between experiments, scenario summaries)
    Scenario,
    /// Validation results (pass/fail messages, validation checks)
    Validation,
}

impl LogEvent {
    /// This event and every event above it
    /// Hierarchy: Bid -> Iteration -> Convergence -> Experiment -> Scenario -> Validation
    fn upward(self) -> &'static [LogEvent] {
        static ORDER: [LogEvent; 6] = [
            LogEvent::Bid,
            LogEvent::Iteration,
            LogEvent::Convergence,
            LogEvent::Experiment,
            LogEvent::Scenario,
            LogEvent::Validation,
        ];
        let start = ORDER.iter().position(|&e| e == self).unwrap_or(0);
        &ORDER[start..]
    }
}

/// Trait for log receivers that can receive log messages
pub trait LogReceiver {
    /// Check if this receiver should handle the given log event
    fn should_log(&self, event: LogEvent) -> bool;

    /// Write a string to this receiver
    fn write(&mut self, s: &str) -> io::Result<()>;

    /// Flush this receiver
    fn flush(&mut self) -> io::Result<()>;
}

/// Console log receiver (writes to stdout)
pub struct ConsoleReceiver {
    enabled_events: Vec<LogEvent>,
}

impl ConsoleReceiver {
    /// Create a new console receiver
    /// Returns a boxed receiver ready to be added to a logger
    pub fn new(enabled_events: Vec<LogEvent>) -> Box<dyn LogReceiver> {
        Box::new(Self { enabled_events })
    }
}

impl LogReceiver for ConsoleReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.enabled_events.contains(&event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        print!("{}", s);
        io::stdout().flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// File log receiver (writes to a file)
pub struct FileReceiver {
    file: File,
    enabled_events: Vec<LogEvent>,
}

impl FileReceiver {
    /// Create a new file receiver that writes to the specified path
    /// The file is truncated if it exists and parent directories are created if needed
    pub fn new(path: &Path, enabled_events: Vec<LogEvent>) -> io::Result<Box<dyn LogReceiver>> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Box::new(Self { file, enabled_events }))
    }
}

impl LogReceiver for FileReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.enabled_events.contains(&event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        write!(self.file, "{}", s)?;
        self.file.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Unique identifier for a receiver
pub type ReceiverId = usize;

/// Global counter for generating unique receiver IDs
static RECEIVER_ID_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Main logger that manages multiple receivers
pub struct Logger {
    receivers: Vec<(ReceiverId, Box<dyn LogReceiver>)>,
}

impl Logger {
    /// Create a new logger with no receivers
    pub fn new() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }

    /// Add a receiver to the logger and return its unique ID
    pub fn add_receiver(&mut self, receiver: Box<dyn LogReceiver>) -> ReceiverId {
        let id = RECEIVER_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.receivers.push((id, receiver));
        id
    }

    /// Remove a receiver by its ID
    pub fn remove_receiver(&mut self, id: ReceiverId) {
        self.receivers.retain(|(receiver_id, _)| *receiver_id != id);
    }

    /// True if any receiver listens to this event, used to skip building expensive messages
    pub fn is_listening(&self, event: LogEvent) -> bool {
        self.receivers.iter().any(|(_, receiver)| receiver.should_log(event))
    }

    /// Write a message with a specific log event type
    pub fn log(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        for (_, receiver) in &mut self.receivers {
            if receiver.should_log(event) {
                receiver.write(message)?;
            }
        }
        Ok(())
    }

    /// Write a message with newline
    pub fn logln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.log(event, &format!("{}\n", message))
    }

    /// Write a message with newline to the specified event and all upward events
    /// Each receiver receives the message only once, even if it listens to multiple events
    fn log_with_prefix(&mut self, event: LogEvent, prefix: &str, message: &str) -> io::Result<()> {
        let events = event.upward();
        let formatted_message = format!("{} {}\n", prefix, message);
        for (_, receiver) in &mut self.receivers {
            if events.iter().any(|&evt| receiver.should_log(evt)) {
                receiver.write(&formatted_message)?;
            }
        }
        Ok(())
    }

    /// Write a message with newline to the specified event and all upward events
    /// Automatically prepends "ERROR" to the message
    pub fn errln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.log_with_prefix(event, "ERROR", message)
    }

    /// Write a message with newline to the specified event and all upward events
    /// Automatically prepends "WARNING" to the message
    pub fn warnln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.log_with_prefix(event, "WARNING", message)
    }

    /// Flush all receivers
    pub fn flush(&mut self) -> io::Result<()> {
        for (_, receiver) in &mut self.receivers {
            receiver.flush()?;
        }
        Ok(())
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitize a string to be used as a filename
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Macro to log a formatted string (like println! but for logger)
#[macro_export]
macro_rules! logln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.logln($event, &format!($($arg)*));
        }
    };
}

/// Macro to log a formatted string without newline (like print! but for logger)
#[macro_export]
macro_rules! log {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.log($event, &format!($($arg)*));
        }
    };
}

/// Macro to log a formatted string with newline to the specified event and all upward events
/// Automatically prepends "ERROR"
#[macro_export]
macro_rules! errln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.errln($event, &format!($($arg)*));
        }
    };
}

/// Macro to log a formatted string with newline to the specified event and all upward events
/// Automatically prepends "WARNING"
#[macro_export]
macro_rules! warnln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {
        {
            let _ = $logger.warnln($event, &format!($($arg)*));
        }
    };
}

/// Receiver collecting everything into a shared buffer, for tests across the crate
#[cfg(test)]
pub(crate) mod capture {
    use super::*;
    use std::rc::Rc;
    use std::cell::RefCell;

    pub(crate) struct Capture {
        pub events: Vec<LogEvent>,
        pub out: Rc<RefCell<String>>,
    }

    impl Capture {
        /// Boxed receiver plus the buffer it writes into
        pub fn new(events: Vec<LogEvent>) -> (Box<dyn LogReceiver>, Rc<RefCell<String>>) {
            let out = Rc::new(RefCell::new(String::new()));
            (Box::new(Capture { events, out: out.clone() }), out)
        }
    }

    impl LogReceiver for Capture {
        fn should_log(&self, event: LogEvent) -> bool {
            self.events.contains(&event)
        }

        fn write(&mut self, s: &str) -> io::Result<()> {
            self.out.borrow_mut().push_str(s);
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::capture::Capture;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test name"), "test_name");
        assert_eq!(sanitize_filename("test/name"), "test_name");
        assert_eq!(sanitize_filename("test:name"), "test_name");
    }

    #[test]
    fn test_warnings_travel_upward_once() {
        let (receiver, out) = Capture::new(vec![LogEvent::Scenario, LogEvent::Validation]);
        let mut logger = Logger::new();
        let id = logger.add_receiver(receiver);
        logln!(logger, LogEvent::Iteration, "pass 1");
        warnln!(logger, LogEvent::Convergence, "cap reached");
        logln!(logger, LogEvent::Scenario, "done");
        assert_eq!(out.borrow().as_str(), "WARNING cap reached\ndone\n");

        logger.remove_receiver(id);
        logln!(logger, LogEvent::Scenario, "dropped");
        assert_eq!(out.borrow().as_str(), "WARNING cap reached\ndone\n");
    }

    #[test]
    fn test_warnings_do_not_travel_downward() {
        let (receiver, out) = Capture::new(vec![LogEvent::Bid]);
        let mut logger = Logger::new();
        logger.add_receiver(receiver);
        assert!(logger.is_listening(LogEvent::Bid));
        assert!(!logger.is_listening(LogEvent::Scenario));
        errln!(logger, LogEvent::Scenario, "broken");
        assert!(out.borrow().is_empty());
    }
}
