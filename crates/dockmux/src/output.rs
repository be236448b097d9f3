use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dockmux_frame::{Chunk, StreamType};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    index: usize,
    stream: StreamType,
    size: usize,
    payload: &'a str,
}

/// Running per-stream counts for `inspect --summary`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamTotals {
    pub chunks: usize,
    pub bytes: usize,
}

#[derive(Serialize)]
struct TotalsOutput {
    stream: StreamType,
    chunks: usize,
    bytes: usize,
}

/// Prints chunks as they arrive, except `Table` which renders once at the end.
pub struct ChunkPrinter {
    format: OutputFormat,
    table: Option<Table>,
}

impl ChunkPrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = (format == OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "STREAM", "SIZE", "PAYLOAD"]);
            table
        });
        Self { format, table }
    }

    pub fn print(&mut self, index: usize, chunk: &Chunk) {
        let preview = payload_preview(chunk.payload.as_ref());
        match self.format {
            OutputFormat::Json => {
                let out = ChunkOutput {
                    index,
                    stream: chunk.stream,
                    size: chunk.payload.len(),
                    payload: &preview,
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        index.to_string(),
                        chunk.stream.to_string(),
                        chunk.payload.len().to_string(),
                        preview,
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!(
                    "#{index} stream={} size={} payload={preview}",
                    chunk.stream,
                    chunk.payload.len()
                );
            }
            OutputFormat::Raw => print_raw(chunk.payload.as_ref()),
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

pub fn print_totals(totals: &[StreamTotals; 3], format: OutputFormat) {
    let rows = StreamType::ALL.map(|stream| {
        let t = totals[usize::from(stream.tag())];
        TotalsOutput {
            stream,
            chunks: t.chunks,
            bytes: t.bytes,
        }
    });

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STREAM", "CHUNKS", "BYTES"]);
            for row in &rows {
                table.add_row(vec![
                    row.stream.to_string(),
                    row.chunks.to_string(),
                    row.bytes.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!("{} chunks={} bytes={}", row.stream, row.chunks, row.bytes);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Characters of a text payload shown by `inspect`.
const PREVIEW_CHARS: usize = 64;

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => match text.char_indices().nth(PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        },
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
