use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::constants::{RAW_RECORD_SIZE, RAW_RECORD_FIELDS};
use super::error::RawStreamError;
use super::hit::{HitRecord, HitType};

/// Reader over a decoded FIFO stream.
///
/// A decoded stream is a flat file of fixed-size records (ten little-endian i32:
/// device, fifo, type, counter, column, pixel, tdc, rollover, coarse, fine). The reader
/// can be opened at any entry index, which is what makes spill scanning resumable.
#[derive(Debug)]
pub struct RawStreamReader {
    file_path: PathBuf,
    reader: BufReader<File>,
    current_entry: u64,
    n_entries: u64,
}

impl RawStreamReader {
    /// Open a stream positioned at `start_entry`
    pub fn open(path: &Path, start_entry: u64) -> Result<Self, RawStreamError> {
        if !path.exists() {
            return Err(RawStreamError::BadFilePath(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let n_entries = file.metadata()?.len() / RAW_RECORD_SIZE;
        let mut reader = BufReader::new(file);
        let current_entry = start_entry.min(n_entries);
        reader.seek(SeekFrom::Start(current_entry * RAW_RECORD_SIZE))?;
        Ok(Self {
            file_path: path.to_path_buf(),
            reader,
            current_entry,
            n_entries,
        })
    }

    /// Number of complete records in the stream
    pub fn n_entries(&self) -> u64 {
        self.n_entries
    }

    /// Index of the next record to be read
    pub fn current_entry(&self) -> u64 {
        self.current_entry
    }

    pub fn get_filename(&self) -> &Path {
        &self.file_path
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at the end of the stream; a trailing partial record counts
    /// as the end. A record with an unknown type still advances the cursor.
    pub fn next_record(&mut self) -> Result<Option<HitRecord>, RawStreamError> {
        if self.current_entry >= self.n_entries {
            return Ok(None);
        }
        let mut buffer = [0u8; RAW_RECORD_SIZE as usize];
        match self.reader.read_exact(&mut buffer) {
            Ok(()) => (),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(RawStreamError::IOError(e)),
        }
        let entry = self.current_entry;
        self.current_entry += 1;

        let mut fields = [0i32; RAW_RECORD_FIELDS];
        let mut cursor = &buffer[..];
        for field in fields.iter_mut() {
            *field = cursor.read_i32::<LittleEndian>()?;
        }
        let hit_type =
            HitType::try_from(fields[2]).map_err(|e| RawStreamError::BadRecord(entry, e))?;
        Ok(Some(HitRecord {
            device: fields[0],
            fifo: fields[1],
            hit_type,
            counter: fields[3],
            column: fields[4],
            pixel: fields[5],
            tdc: fields[6],
            rollover: fields[7],
            coarse: fields[8],
            fine: fields[9],
        }))
    }
}

/// Writes HitRecords in the decoded stream layout
#[derive(Debug)]
pub struct RawStreamWriter {
    writer: BufWriter<File>,
    n_written: u64,
}

impl RawStreamWriter {
    pub fn create(path: &Path) -> Result<Self, RawStreamError> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            n_written: 0,
        })
    }

    pub fn write_record(&mut self, hit: &HitRecord) -> Result<(), RawStreamError> {
        for field in [
            hit.device,
            hit.fifo,
            hit.hit_type.code(),
            hit.counter,
            hit.column,
            hit.pixel,
            hit.tdc,
            hit.rollover,
            hit.coarse,
            hit.fine,
        ] {
            self.writer.write_i32::<LittleEndian>(field)?;
        }
        self.n_written += 1;
        Ok(())
    }

    pub fn n_written(&self) -> u64 {
        self.n_written
    }

    /// Flush and close the stream
    pub fn close(mut self) -> Result<(), RawStreamError> {
        self.writer.flush()?;
        Ok(())
    }
}
