use bucketflow_cloud::{DeletionStep, StepStatus};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner for a teardown, one finished line per step
pub struct TeardownProgress {
    progress_bar: Option<ProgressBar>,
    json: bool,
}

impl TeardownProgress {
    pub fn new(bucket: &str, json: bool) -> Self {
        if json {
            return Self {
                progress_bar: None,
                json,
            };
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb.set_message(format!("Tearing down {}...", bucket));

        Self {
            progress_bar: Some(pb),
            json,
        }
    }

    pub fn step(&self, step: &DeletionStep) {
        if self.json {
            match serde_json::to_string(step) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Could not encode step: {}", e),
            }
            return;
        }
        let Some(pb) = &self.progress_bar else {
            return;
        };

        let label = step.id.label();
        match step.status {
            StepStatus::Running => pb.set_message(format!("{}...", label)),
            StepStatus::Done => {
                let detail = step
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                pb.println(format!("  {} {}{}", "✓".green(), label, detail.dimmed()));
            }
            StepStatus::Error => {
                let error = step.error.as_deref().unwrap_or("unknown error");
                pb.println(format!("  {} {}: {}", "✗".red(), label, error.red()));
            }
            StepStatus::Pending => {}
        }
    }

    pub fn finish(&self, message: &str) {
        if let Some(pb) = &self.progress_bar {
            pb.finish_with_message(message.to_string());
        }
    }
}
