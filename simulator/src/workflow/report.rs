use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Summary of one offline reconstruction, appended to the run log as JSON lines.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub description: Option<String>,
    pub traces: usize,
    pub dims: [usize; 3],
    pub peak_value: f32,
    pub peak_position: [f32; 3],
    pub recon_seconds: f64,
}

impl RunReport {
    pub fn append_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(self)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
