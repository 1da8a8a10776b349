/*!
## Terminal Module

A [`Device`] for hosts that run BASIC in a terminal, plus the Ctrl-C
plumbing that turns an interrupt into a BASIC break.

*/

extern crate ansi_term;
extern crate ctrlc;
extern crate linefeed;
use crate::mach::{Device, Event, Runtime, Target};
use crate::{error, lang::Error};
use ansi_term::Style;
use linefeed::{DefaultTerminal, Interface, ReadResult, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Result<T> = std::result::Result<T, Error>;

fn io_error(error: std::io::Error) -> Error {
    error!(InternalError; &error.to_string())
}

/// Pending user break, shared between a signal handler and the machine.
#[derive(Debug, Clone, Default)]
pub struct BreakSignal(Arc<AtomicBool>);

impl BreakSignal {
    pub fn new() -> BreakSignal {
        BreakSignal::default()
    }

    /// Raise the signal on Ctrl-C. Only one handler may be installed
    /// per process.
    pub fn install(&self) -> std::result::Result<(), ctrlc::Error> {
        let signal = self.clone();
        ctrlc::set_handler(move || signal.raise())
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume a pending break.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Line-edited console. Output that does not end a line is held back
/// and becomes the prompt of the next read.
pub struct Console {
    interface: Interface<DefaultTerminal>,
    signal: BreakSignal,
    pending: String,
}

impl Console {
    pub fn new(signal: BreakSignal) -> std::io::Result<Console> {
        let interface = Interface::new("BASIC")?;
        interface.set_report_signal(Signal::Interrupt, true);
        Ok(Console {
            interface,
            signal,
            pending: String::new(),
        })
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.pending);
        self.interface
            .write_fmt(format_args!("{}", text))
            .map_err(io_error)
    }
}

impl Device for Console {
    fn write(&mut self, text: &str, target: Target) -> Result<()> {
        match target {
            Target::Console => {
                self.pending.push_str(text);
                if let Some(pos) = self.pending.rfind('\n') {
                    let rest = self.pending.split_off(pos + 1);
                    let text = std::mem::replace(&mut self.pending, rest);
                    self.interface
                        .write_fmt(format_args!("{}", text))
                        .map_err(io_error)?;
                }
                Ok(())
            }
            Target::Log => {
                eprintln!("{}", Style::new().bold().paint(text.trim_end_matches('\n')));
                Ok(())
            }
            Target::File(_) | Target::Net(_) => Err(error!(BadFileNumber)),
        }
    }

    fn read(&mut self, buf: &mut String, target: Target) -> Result<bool> {
        if target != Target::Console {
            return Err(error!(BadFileNumber));
        }
        let prompt = std::mem::take(&mut self.pending);
        self.interface.set_prompt(&prompt).map_err(io_error)?;
        match self.interface.read_line().map_err(io_error)? {
            ReadResult::Input(line) => {
                if !line.is_empty() {
                    self.interface.add_history_unique(line.clone());
                }
                buf.push_str(&line);
                Ok(true)
            }
            ReadResult::Signal(Signal::Interrupt) => {
                self.interface.set_buffer("").map_err(io_error)?;
                self.interface
                    .lock_reader()
                    .cancel_read_line()
                    .map_err(io_error)?;
                self.signal.raise();
                Ok(false)
            }
            ReadResult::Signal(_) | ReadResult::Eof => Ok(false),
        }
    }

    fn poll_break(&mut self) -> bool {
        self.signal.take()
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Drive a runtime until it stops, printing uncaught errors in bold.
pub fn run(runtime: &mut Runtime) -> Event {
    loop {
        match runtime.execute(5000) {
            Event::Running => {}
            Event::Error(error) => {
                eprintln!("{}", Style::new().bold().paint(format!("?{}", error)));
                return Event::Error(error);
            }
            Event::Break => {
                eprintln!("{}", Style::new().bold().paint("BREAK"));
                return Event::Break;
            }
            event => return event,
        }
    }
}
