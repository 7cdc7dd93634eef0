#![cfg(test)]

use std::{
    sync::{Mutex, Once},
    thread::{self, ThreadId},
};

use log::{Level, LevelFilter, Log, Metadata, Record};

static RECORDS: Mutex<Vec<(ThreadId, Level, String)>> = Mutex::new(Vec::new());
static INSTALL: Once = Once::new();

/// Keeps every record with the thread that emitted it, so tests running in parallel only see
/// their own output.
struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = RECORDS.lock() {
            records.push((thread::current().id(), record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

/// Runs `f` and returns what it logged from the calling thread at `level` or more severe.
pub fn captured<T>(level: Level, f: impl FnOnce() -> T) -> (T, Vec<String>) {
    INSTALL.call_once(|| {
        log::set_logger(&Capture).unwrap();
        log::set_max_level(LevelFilter::Debug);
    });

    let id = thread::current().id();
    let out = f();

    let lines = RECORDS
        .lock()
        .unwrap()
        .iter()
        .filter(|(thread, lvl, _)| *thread == id && *lvl <= level)
        .map(|(_, _, line)| line.clone())
        .collect();

    (out, lines)
}
