use indicatif::{ProgressBar, ProgressStyle};

/// Terminal view state
pub struct StatusView {
    pub status_message: String,
    pub is_busy: bool,
    bar: ProgressBar,
    label: Option<String>,
}

impl Default for StatusView {
    fn default() -> Self {
        Self {
            status_message: String::new(),
            is_busy: false,
            bar: ProgressBar::hidden(),
            label: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StatusMessage {
    /// Item counter for the named step.
    Progress {
        label: String,
        current: usize,
        total: usize,
    },
    /// Byte progress of a single transfer, 0.0 to 1.0.
    Transfer(f32),
    Status(String),
    /// Printed above the bar so it survives redraws.
    Note(String),
    Done(String),
}

impl StatusView {
    pub fn update(&mut self, message: StatusMessage) {
        match message {
            StatusMessage::Progress {
                label,
                current,
                total,
            } => {
                if self.label.as_deref() != Some(label.as_str()) {
                    self.start_bar(&label, total as u64);
                    self.label = Some(label);
                }
                self.bar.set_length(total as u64);
                self.bar.set_position(current as u64);
            }
            StatusMessage::Transfer(progress) => {
                if self.label.as_deref() != Some("transfer") {
                    self.start_bar("transfer", 100);
                    self.label = Some("transfer".to_string());
                }
                self.bar
                    .set_position((progress.clamp(0.0, 1.0) * 100.0).round() as u64);
            }
            StatusMessage::Status(message) => {
                self.bar.set_message(message.clone());
                self.status_message = message;
            }
            StatusMessage::Note(note) => {
                if self.bar.is_hidden() {
                    eprintln!("{}", note);
                } else {
                    self.bar.println(note);
                }
            }
            StatusMessage::Done(message) => {
                self.bar.finish_and_clear();
                self.bar = ProgressBar::hidden();
                self.label = None;
                self.is_busy = false;
                eprintln!("{}", message);
                self.status_message = message;
            }
        }
    }

    fn start_bar(&mut self, label: &str, total: u64) {
        self.bar.finish_and_clear();
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:>12} {bar:40} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_prefix(label.to_string());
        self.bar = bar;
        self.is_busy = true;
    }
}
