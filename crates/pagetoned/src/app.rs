//! Event loop for detections and child processes
//!
//! Every [`ToneEvent::Detection`] is printed and, if a child
//! program was given, starts a new child process. Children run
//! concurrently with detection; they are reaped as they exit
//! and awaited when the input ends.
//!
//! ```txt
//!   start
//!   ||
//!   \/
//! +-------------+  == Detection ==>  spawn child
//! |  Listening  |  == Debug ======>  log
//! +-------------+  == Error ======>  exit 1
//!   ||
//!   \/
//!   end of input ==> wait for children
//! ```

use std::process::Child;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, warn};
use pagetone::{DetectionConfig, DetectionService, ToneEvent};

use crate::cli::{Args, CliError};
use crate::spawner;

/// Run the application
///
/// Receives every event from the already-started `service`
/// until the input ends. Fails if the service reports an
/// error.
pub fn run(args: &Args, service: &mut DetectionService) -> Result<(), CliError> {
    let cfg = Config {
        child_args: args.child.iter().map(String::as_str).collect(),
        input_rate_str: args.rate.to_string(),
        quiet: args.quiet,
    };

    let mut children: Vec<Child> = Vec::new();
    let mut failure = None;

    for evt in service.events() {
        reap(&mut children);

        match evt {
            ToneEvent::Detection { config_index } => {
                let config = match args.detect.get(config_index) {
                    Some(config) => config,
                    None => {
                        warn!("detection for unknown pattern #{}", config_index);
                        continue;
                    }
                };

                let at = Utc::now();
                if !cfg.quiet {
                    println!("{}", detection_line(&at, config_index, config));
                }

                if let Some(child) = cfg.spawn(config_index, config, &at) {
                    children.push(child);
                }
            }
            ToneEvent::Debug(msg) => debug!("{}", msg),
            ToneEvent::Error(err) => {
                error!("{}", err);
                failure = Some(err);
                break;
            }
        }
    }

    for mut child in children.drain(..) {
        match child.wait() {
            Ok(exit) => log_exit(&child, exit),
            Err(err) => error!("unable to await child process exit: {}", err),
        }
    }

    match failure {
        Some(err) => Err(CliError::new(anyhow!(err).context("audio input failed"), 1)),
        None => Ok(()),
    }
}

/// Configuration
#[derive(Clone, Debug)]
struct Config<'args> {
    child_args: Vec<&'args str>,
    input_rate_str: String,
    quiet: bool,
}

impl<'args> Config<'args> {
    // start a child for this detection, if one was requested
    fn spawn(
        &self,
        config_index: usize,
        config: &DetectionConfig,
        at: &DateTime<Utc>,
    ) -> Option<Child> {
        let (cmd, args) = match self.child_args.split_first() {
            Some(split) => split,
            None => {
                debug!("no child process to spawn");
                return None;
            }
        };

        match spawner::spawn(cmd, args, config_index, config, at, &self.input_rate_str) {
            Ok(child) => {
                debug!("spawned child process PID {}", child.id());
                Some(child)
            }
            Err(err) => {
                error!("unable to spawn child process: {}", err);
                None
            }
        }
    }
}

// forget children which have exited
fn reap(children: &mut Vec<Child>) {
    children.retain_mut(|child| match child.try_wait() {
        Ok(Some(exit)) => {
            log_exit(child, exit);
            false
        }
        Ok(None) => true,
        Err(err) => {
            error!("unable to check child process PID {}: {}", child.id(), err);
            false
        }
    });
}

fn log_exit(child: &Child, exit: std::process::ExitStatus) {
    if exit.success() {
        debug!("child process PID {} exited successfully", child.id());
    } else {
        warn!(
            "child process PID {} exited abnormally with status {}",
            child.id(),
            exit.code().unwrap_or(1)
        );
    }
}

// the line printed to stdout for every detection
fn detection_line(at: &DateTime<Utc>, config_index: usize, config: &DetectionConfig) -> String {
    format!(
        "{} #{} {}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true),
        config_index,
        config
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_line() {
        let at: DateTime<Utc> = DateTime::parse_from_rfc2822("Wed, 18 Feb 2015 23:16:09 GMT")
            .unwrap()
            .into();
        let cfg: DetectionConfig = "qcii:569.1:1687.2".parse().unwrap();
        assert_eq!(
            "2015-02-18T23:16:09Z #2 qcii:569.1:1687.2",
            detection_line(&at, 2, &cfg)
        );
    }

    #[test]
    fn test_no_child() {
        let cfg = Config {
            child_args: vec![],
            input_rate_str: "8000".to_owned(),
            quiet: true,
        };
        let pattern = DetectionConfig::dtmf("1");
        assert!(cfg.spawn(0, &pattern, &Utc::now()).is_none());
    }
}
