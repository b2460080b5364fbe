use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Json,
    Jsonl,
    Csv,
    #[value(alias = "txt")]
    Text,
}

/// Open the output file, or stdout when no path is given.
pub fn destination(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout()),
    })
}

enum Sink<W: Write> {
    Csv(csv::Writer<W>),
    Jsonl(W),
    Buffered {
        out: W,
        format: Format,
        records: Vec<Record>,
    },
}

/// Writes records in the requested format. CSV and JSON Lines stream as
/// records arrive; JSON and text are produced by [`RecordWriter::finish`].
pub struct RecordWriter<W: Write> {
    sink: Sink<W>,
    columns: Vec<String>,
    count: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, format: Format, columns: Vec<String>) -> Result<Self> {
        let sink = match format {
            Format::Csv => {
                let mut writer = csv::Writer::from_writer(out);
                let header: Vec<&str> = std::iter::once(crate::recipe::RESERVED_FIELD)
                    .chain(columns.iter().map(String::as_str))
                    .collect();
                writer.write_record(&header)?;
                Sink::Csv(writer)
            }
            Format::Jsonl => Sink::Jsonl(out),
            Format::Json | Format::Text => Sink::Buffered {
                out,
                format,
                records: Vec::new(),
            },
        };

        Ok(Self {
            sink,
            columns,
            count: 0,
        })
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        match &mut self.sink {
            Sink::Csv(writer) => {
                writer.write_record(record.row(&self.columns))?;
                writer.flush()?;
            }
            Sink::Jsonl(out) => {
                serde_json::to_writer(&mut *out, record)?;
                out.write_all(b"\n")?;
            }
            Sink::Buffered { records, .. } => records.push(record.clone()),
        }
        self.count += 1;
        Ok(())
    }

    /// Flush everything; returns the number of records written.
    pub fn finish(self) -> Result<usize> {
        match self.sink {
            Sink::Csv(mut writer) => writer.flush()?,
            Sink::Jsonl(mut out) => out.flush()?,
            Sink::Buffered {
                mut out,
                format,
                records,
            } => {
                if format == Format::Json {
                    serde_json::to_writer_pretty(&mut out, &records)?;
                    out.write_all(b"\n")?;
                } else {
                    out.write_all(format_text(&records, &self.columns).as_bytes())?;
                }
                out.flush()?;
            }
        }
        Ok(self.count)
    }
}

/// Format results as plain text
fn format_text(records: &[Record], columns: &[String]) -> String {
    let width = columns.iter().map(String::len).max().unwrap_or(0);
    let mut output = String::new();

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            output.push('\n');
            output.push_str(&"=".repeat(80));
            output.push_str("\n\n");
        }

        output.push_str(&format!("Source: {}\n", record.source));
        for column in columns {
            output.push_str(&format!(
                "  {:width$}  {}\n",
                column,
                record.get(column).unwrap_or("-"),
                width = width
            ));
        }
    }

    output
}
