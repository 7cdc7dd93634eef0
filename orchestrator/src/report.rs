use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::Path,
};

use log::{debug, info};

use crate::{
    Result,
    configs::Configuration,
    state::{BestState, CSV_HEADER, EpochMetrics},
};

/// The sinks of a run: the log facade, plus `run.log` and `metrics.csv` in the output
/// directory when the configuration dumps files.
#[derive(Debug)]
pub struct RunLog {
    log: Option<File>,
    csv: Option<File>,
}

impl RunLog {
    /// Opens the run's files in append mode, creating the output directory if needed.
    pub fn open(config: &Configuration) -> Result<Self> {
        if !config.dump_file {
            return Ok(Self {
                log: None,
                csv: None,
            });
        }

        fs::create_dir_all(&config.output_dir)?;
        let log = append(&config.log_path())?;
        let mut csv = append(&config.csv_path())?;
        if csv.metadata()?.len() == 0 {
            writeln!(csv, "{CSV_HEADER}")?;
        }

        Ok(Self {
            log: Some(log),
            csv: Some(csv),
        })
    }

    /// Records a message, at info level when it's meant for the console and at debug level
    /// otherwise.
    pub fn log(&mut self, message: &str, to_console: bool) -> Result<()> {
        if to_console {
            info!("{message}");
        } else {
            debug!("{message}");
        }

        if let Some(file) = &mut self.log {
            writeln!(file, "{message}")?;
        }

        Ok(())
    }

    /// Records the metrics of one epoch.
    pub fn csv(&mut self, metrics: &EpochMetrics) -> Result<()> {
        let row = metrics.csv_row();
        info!("epoch finished: {CSV_HEADER}={row}");

        if let Some(file) = &mut self.csv {
            writeln!(file, "{row}")?;
        }

        Ok(())
    }

    /// Records the validation results of the best epoch of the run.
    pub fn print_summary(&mut self, best: &BestState) -> Result<()> {
        let summary = format!(
            "Best :: val loss: {:.6}, val acc: {:.6}, val avg acc: {:.6}",
            best.loss, best.accuracy, best.balanced_accuracy
        );
        self.log(&summary, true)
    }
}

fn append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 1.,
            train_acc: 0.5,
            train_bal_acc: 0.5,
            val_loss: 1.,
            val_acc: 0.5,
            val_bal_acc: 0.5,
            elapsed_secs: 1.,
        }
    }

    #[test]
    fn files_are_written_when_dumping() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };

        let mut log = RunLog::open(&config).unwrap();
        log.log("model description", false).unwrap();
        log.csv(&metrics(0)).unwrap();
        log.print_summary(&BestState::default()).unwrap();
        drop(log);

        // Reopening appends without repeating the header.
        let mut log = RunLog::open(&config).unwrap();
        log.csv(&metrics(1)).unwrap();
        drop(log);

        let csv = fs::read_to_string(config.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[2].starts_with("1,"));

        let run_log = fs::read_to_string(config.log_path()).unwrap();
        assert!(run_log.starts_with("model description\n"));
        assert!(run_log.contains("Best :: val loss: 0.000000"));
    }

    #[test]
    fn nothing_is_written_without_dumping() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration {
            output_dir: dir.path().join("out"),
            dump_file: false,
            ..Default::default()
        };

        let mut log = RunLog::open(&config).unwrap();
        log.log("hello", true).unwrap();
        log.csv(&metrics(0)).unwrap();

        assert!(!config.output_dir.exists());
    }
}
