//! Bug reports filed as GitHub issues.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The part of the editor a report was sent from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Teacher,
    Code,
    Blocks,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Teacher => "teacher",
            Mode::Code => "code",
            Mode::Blocks => "blocks",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IssueError {
    #[error("the bug report has no title")]
    MissingTitle,
    #[error("the bug report has no description")]
    MissingDescription,
}

/// A bug report as submitted by a user.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct BugReport {
    pub description: String,
    pub title: String,
    /// The page the user was looking at.
    pub url: String,
    #[serde(default)]
    pub browser: Option<String>,
    pub mode: Mode,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BugReport {
    pub fn validate(&self) -> Result<(), IssueError> {
        if self.title.trim().is_empty() {
            return Err(IssueError::MissingTitle);
        }
        if self.description.trim().is_empty() {
            return Err(IssueError::MissingDescription);
        }
        Ok(())
    }

    /// Renders the issue body, in Spanish like the editor itself.
    pub fn to_markdown_body(&self) -> String {
        let mut body = String::new();

        // writing to a `String` cannot fail
        let _ = writeln!(body, "{}\n", self.description.trim_end());
        let _ = match non_empty(&self.email) {
            Some(email) => writeln!(body, "_Defecto reportado por [{email}](mailto:{email})._\n"),
            None => writeln!(
                body,
                "_Defecto reportado por alguien que no dejó su correo electrónico._\n"
            ),
        };

        let browser = non_empty(&self.browser).unwrap_or("(desconocido)");
        let course = non_empty(&self.course).unwrap_or("(ninguno)");
        let project = non_empty(&self.project).unwrap_or("(ninguno)");

        body.push_str("<details>\n");
        body.push_str("  <summary>:information_source: Información adicional</summary>\n\n");
        let _ = writeln!(body, "  - :globe_with_meridians: **Navegador:** {browser}");
        let _ = writeln!(body, "  - :paperclip: **URL consultada:** {}", self.url);
        let _ = writeln!(body, "  - :closed_book: **Curso:** {course}");
        let _ = writeln!(body, "  - :pencil: **Proyecto:** {project}");
        body.push_str("</details>");

        body
    }
}
