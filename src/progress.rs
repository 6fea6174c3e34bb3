//! Build progress reporting.
//!
//! `mindcare build` reports what it is doing per ingestion stage so a long
//! summarize/embed run is observable. Progress goes to **stderr** so the
//! final report on stdout stays parseable.

use std::io::Write;

/// Pipeline stage named in progress events.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Load,
    Split,
    Summarize,
    Embed,
    Index,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Split => "split",
            Stage::Summarize => "summarize",
            Stage::Embed => "embed",
            Stage::Index => "index",
        }
    }
}

#[derive(Clone, Debug)]
pub enum BuildProgressEvent {
    /// A stage started; total unknown.
    Started { stage: Stage },
    /// `n` of `total` units done in this stage.
    Advanced { stage: Stage, n: u64, total: u64 },
}

pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly lines: "build  summarize  12 / 1,340 nodes".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Started { stage } => format!("build  {}...\n", stage.as_str()),
            BuildProgressEvent::Advanced { stage, n, total } => format!(
                "build  {}  {} / {} {}\n",
                stage.as_str(),
                format_number(*n),
                format_number(*total),
                unit(*stage)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Started { stage } => serde_json::json!({
                "event": "progress",
                "stage": stage.as_str(),
                "phase": "started"
            }),
            BuildProgressEvent::Advanced { stage, n, total } => serde_json::json!({
                "event": "progress",
                "stage": stage.as_str(),
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

fn unit(stage: Stage) -> &'static str {
    match stage {
        Stage::Load => "documents",
        _ => "nodes",
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn parse_modes() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }
}
