//! Optional stylesheet pass over the serialized header.
//!
//! The pipeline is a pure text transform: header XML in, header XML out.
//! Without a template the header passes through unchanged.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;

use crate::error::{ConvertError, Result};

/// Something able to apply an XML stylesheet to a document.
pub trait StylesheetEngine: fmt::Debug {
    /// Transform `input` with the stylesheet at `template`.
    fn apply(&self, input: &str, template: &Path) -> Result<String>;
}

/// Runs the external `xsltproc` program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsltProc {
    program: PathBuf,
}

impl Default for XsltProc {
    fn default() -> Self {
        XsltProc {
            program: PathBuf::from("xsltproc"),
        }
    }
}

impl XsltProc {
    /// Use a specific executable instead of the one on `PATH`.
    pub fn with_program<P: Into<PathBuf>>(program: P) -> Self {
        XsltProc {
            program: program.into(),
        }
    }
}

impl StylesheetEngine for XsltProc {
    fn apply(&self, input: &str, template: &Path) -> Result<String> {
        let mut document = NamedTempFile::new()?;
        document.write_all(input.as_bytes())?;
        document.flush()?;

        let output = Command::new(&self.program)
            .arg(template)
            .arg(document.path())
            .output()
            .map_err(|e| {
                ConvertError::Transform(format!("cannot run {}: {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Transform(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| ConvertError::Transform("transformed header is not UTF-8".to_string()))
    }
}

/// The header transform of a conversion run.
#[derive(Debug)]
pub struct TransformPipeline {
    template: Option<PathBuf>,
    engine: Box<dyn StylesheetEngine>,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        TransformPipeline::passthrough()
    }
}

impl TransformPipeline {
    /// A pipeline which returns its input unchanged.
    pub fn passthrough() -> Self {
        TransformPipeline {
            template: None,
            engine: Box::new(XsltProc::default()),
        }
    }

    /// A pipeline applying `template` with `xsltproc`.
    pub fn with_stylesheet<P: Into<PathBuf>>(template: P) -> Self {
        TransformPipeline::with_engine(template, XsltProc::default())
    }

    /// A pipeline applying `template` with a custom engine.
    pub fn with_engine<P, E>(template: P, engine: E) -> Self
    where
        P: Into<PathBuf>,
        E: StylesheetEngine + 'static,
    {
        TransformPipeline {
            template: Some(template.into()),
            engine: Box::new(engine),
        }
    }

    /// The stylesheet, if any.
    pub fn template(&self) -> Option<&Path> {
        self.template.as_deref()
    }

    /// Transform a header document. Without a stylesheet the input is returned unchanged.
    pub fn apply(&self, input: &str) -> Result<String> {
        match &self.template {
            None => Ok(input.to_string()),
            Some(template) => {
                debug!("applying stylesheet {}", template.display());
                self.engine.apply(input, template)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Rename;

    impl StylesheetEngine for Rename {
        fn apply(&self, input: &str, template: &Path) -> Result<String> {
            let to = template.to_string_lossy();
            Ok(input.replace("ismrmrdHeader", &to))
        }
    }

    #[test]
    fn passthrough_keeps_input() {
        let doc = "<ismrmrdHeader>\n  <version>1</version>\n</ismrmrdHeader>";
        let pipeline = TransformPipeline::passthrough();
        assert_eq!(pipeline.template(), None);
        assert_eq!(pipeline.apply(doc).unwrap(), doc);
    }

    #[test]
    fn engine_gets_template() {
        let pipeline = TransformPipeline::with_engine("header", Rename);
        assert_eq!(pipeline.template(), Some(Path::new("header")));
        assert_eq!(pipeline.apply("<ismrmrdHeader/>").unwrap(), "<header/>");
    }

    #[test]
    fn missing_program_is_a_transform_error() {
        let engine = XsltProc::with_program("/nonexistent/bin/xsltproc");
        let pipeline = TransformPipeline::with_engine("any.xsl", engine);
        match pipeline.apply("<a/>") {
            Err(ConvertError::Transform(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
