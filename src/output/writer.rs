//! CSV sinks for crawl results

use crate::job::CrawlResult;
use crate::spider::SpiderSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Writes one CSV row per crawl result
///
/// The header row is written on creation, so an empty crawl still yields a
/// well-formed file.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
    with_spider: bool,
    rows: u64,
}

impl ResultWriter<File> {
    /// Creates (or truncates) a CSV file
    pub fn create(path: &Path, with_spider: bool) -> Result<Self, csv::Error> {
        Self::new(File::create(path)?, with_spider)
    }
}

impl ResultWriter<io::Stdout> {
    pub fn stdout(with_spider: bool) -> Result<Self, csv::Error> {
        Self::new(io::stdout(), with_spider)
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn new(inner: W, with_spider: bool) -> Result<Self, csv::Error> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CrawlResult::headers(with_spider))?;
        Ok(Self {
            writer,
            with_spider,
            rows: 0,
        })
    }

    pub fn write(&mut self, result: &CrawlResult) -> Result<(), csv::Error> {
        self.writer.write_record(result.as_row(self.with_spider))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header excluded
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> Result<W, csv::Error> {
        self.writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

/// Writes the rows spiders derive from their data
///
/// Rows have no header since their shape is up to each spider.
pub struct TableWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl TableWriter<File> {
    pub fn create(path: &Path) -> Result<Self, csv::Error> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .flexible(true)
                .has_headers(false)
                .from_writer(inner),
        }
    }

    /// Writes the rows the result's spider tabulates from its data
    ///
    /// # Returns
    ///
    /// The number of rows written; errored results and results without
    /// data write nothing.
    pub fn write(&mut self, spiders: &SpiderSet, result: &CrawlResult) -> Result<usize, csv::Error> {
        let CrawlResult::Success(success) = result else {
            return Ok(0);
        };
        let Some(data) = &success.data else {
            return Ok(0);
        };
        let Some(spider) = spiders.resolve(success.job.spider()) else {
            return Ok(0);
        };

        let rows = spider.tabulate(data);
        for row in &rows {
            self.writer.write_record(row)?;
        }
        Ok(rows.len())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> Result<W, csv::Error> {
        self.writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}
