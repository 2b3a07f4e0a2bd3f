//! Scripted client input
//!
//! The client reads newline-delimited commands from stdin. A WRITE opens a
//! multi-line block of `<sentence-index> <text>` lines closed by `ETIRW`.

use std::fmt;

use crate::verify::PAYLOAD;

/// Ordered command lines fed to the client in one go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedTranscript {
    lines: Vec<String>,
}

impl ScriptedTranscript {
    /// CREATE, WRITE at offset 0, payload, ETIRW, READ, QUIT
    pub fn roundtrip(filename: &str) -> Self {
        Self::roundtrip_with_payload(filename, PAYLOAD)
    }

    pub fn roundtrip_with_payload(filename: &str, payload: &str) -> Self {
        Self {
            lines: vec![
                format!("CREATE {}", filename),
                format!("WRITE {} 0", filename),
                format!("0 {}", payload),
                "ETIRW".to_string(),
                format!("READ {}", filename),
                "QUIT".to_string(),
            ],
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Full stdin payload, every line newline-terminated
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ScriptedTranscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
