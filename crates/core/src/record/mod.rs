use std::{
    fs::File,
    io::{self, BufWriter, Write},
};

use serde::{Deserialize, Serialize};

use crate::{
    scene::{SceneScript, SceneStep},
    AlgoVizError, Result,
};

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Target file; empty or `-` writes to stdout.
    pub output_path: String,
    pub pretty: bool,
}

impl RecordingSettings {
    pub fn writes_to_stdout(&self) -> bool {
        self.output_path.is_empty() || self.output_path == "-"
    }
}

/// Destination for the steps of a scene, in the order they ran.
pub trait TraceSink {
    fn begin(&mut self, scene: &str) -> Result<()>;
    fn write_step(&mut self, step: &SceneStep) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Buffers steps and writes them as a single JSON document on `finish`.
#[derive(Debug)]
pub struct JsonSink<W: Write> {
    writer: W,
    pretty: bool,
    scene: Option<String>,
    steps: Vec<serde_json::Value>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self {
            writer,
            pretty,
            scene: None,
            steps: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for JsonSink<W> {
    fn begin(&mut self, scene: &str) -> Result<()> {
        if self.scene.is_some() {
            return Err(AlgoVizError::msg("sink already started"));
        }
        self.scene = Some(scene.to_string());
        self.steps.clear();
        Ok(())
    }

    fn write_step(&mut self, step: &SceneStep) -> Result<()> {
        if self.scene.is_none() {
            return Err(AlgoVizError::msg("step written before begin"));
        }
        self.steps.push(serde_json::to_value(step)?);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(scene) = self.scene.take() else {
            return Err(AlgoVizError::msg("finish called before begin"));
        };
        let document = serde_json::json!({
            "scene": scene,
            "steps": std::mem::take(&mut self.steps),
        });
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, &document)?;
        } else {
            serde_json::to_writer(&mut self.writer, &document)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes finished scene scripts to the configured destination.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
    steps_written: usize,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            steps_written: 0,
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    /// Total steps written since the recorder was created.
    pub fn steps_written(&self) -> usize {
        self.steps_written
    }

    pub fn record(&mut self, script: &SceneScript) -> Result<()> {
        if self.settings.writes_to_stdout() {
            let mut sink = JsonSink::new(io::stdout().lock(), self.settings.pretty);
            self.record_to(&mut sink, script)
        } else {
            let file = File::create(&self.settings.output_path)?;
            let mut sink = JsonSink::new(BufWriter::new(file), self.settings.pretty);
            self.record_to(&mut sink, script)?;
            tracing::info!(path = %self.settings.output_path, "wrote scene trace");
            Ok(())
        }
    }

    pub fn record_to<S: TraceSink>(&mut self, sink: &mut S, script: &SceneScript) -> Result<()> {
        sink.begin(&script.scene)?;
        for step in &script.steps {
            sink.write_step(step)?;
            self.steps_written += 1;
        }
        sink.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{EventKind, TraceRecorder};

    fn script() -> SceneScript {
        let mut recorder = TraceRecorder::new();
        recorder.emit(EventKind::Compare, Vec::new(), Vec::new());
        let first = recorder.take();
        recorder.emit(EventKind::Swap, Vec::new(), Vec::new());
        let second = recorder.take();
        SceneScript {
            scene: "demo".to_string(),
            steps: vec![
                SceneStep {
                    label: "first".to_string(),
                    trace: first,
                },
                SceneStep {
                    label: "second".to_string(),
                    trace: second,
                },
            ],
        }
    }

    #[test]
    fn json_sink_writes_one_document() {
        let mut sink = JsonSink::new(Vec::new(), false);
        let mut recorder = Recorder::default();
        recorder.record_to(&mut sink, &script()).unwrap();

        let bytes = sink.into_inner();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["scene"], "demo");
        assert_eq!(value["steps"][1]["label"], "second");
        assert_eq!(value["steps"][1]["trace"][0]["kind"], "swap");
        assert_eq!(value["steps"][1]["trace"][0]["timestampOrdinal"], 1);
        assert_eq!(recorder.steps_written(), 2);
    }

    #[test]
    fn sink_calls_must_be_ordered() {
        let mut sink = JsonSink::new(Vec::new(), true);
        assert!(sink.finish().is_err());
        sink.begin("a").unwrap();
        assert!(sink.begin("b").is_err());
    }

    #[test]
    fn recorder_writes_to_file() {
        let path = std::env::temp_dir().join(format!("algoviz-record-{}.json", std::process::id()));
        let mut recorder = Recorder::new(RecordingSettings {
            output_path: path.display().to_string(),
            pretty: true,
        });
        assert!(recorder.settings().pretty);
        assert!(!recorder.settings().writes_to_stdout());
        recorder.record(&script()).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let parsed: SceneScript = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, script());
    }
}
