use crate::error::{Result, SwarmError};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

/// The pre-sized output file, addressed by absolute offset
pub struct StorageManager {
    path: PathBuf,
    file: File,
    total_length: u64,
    piece_length: u64,
}

impl StorageManager {
    /// Create (or truncate) `output_dir/name` and size it to `total_length`
    pub async fn create<P: AsRef<Path>>(
        output_dir: P,
        name: &str,
        total_length: u64,
        piece_length: u64,
    ) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir).await?;

        // the name comes from untrusted metadata
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| SwarmError::StorageError(format!("invalid file name {:?}", name)))?;
        let path = output_dir.join(file_name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.set_len(total_length).await?;

        info!(
            "Storage initialized: {} ({} bytes)",
            path.display(),
            total_length
        );

        Ok(Self {
            path,
            file,
            total_length,
            piece_length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a verified piece at `index * piece_length`
    pub async fn write_piece(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let offset = self.offset_of(index, data.len())?;

        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        self.file.flush().await?;

        debug!(
            "Wrote piece {} at offset {} ({} bytes)",
            index,
            offset,
            data.len()
        );
        Ok(())
    }

    /// Read `length` bytes of piece `index` back from disk
    pub async fn read_piece(&mut self, index: usize, length: usize) -> Result<Vec<u8>> {
        let offset = self.offset_of(index, length)?;

        self.file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length];
        self.file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Flush to disk and check the file still has its expected size
    pub async fn sync(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;

        let actual = self.file.metadata().await?.len();
        if actual != self.total_length {
            return Err(SwarmError::StorageError(format!(
                "{} is {} bytes, expected {}",
                self.path.display(),
                actual,
                self.total_length
            )));
        }
        Ok(())
    }

    fn offset_of(&self, index: usize, len: usize) -> Result<u64> {
        let offset = index as u64 * self.piece_length;
        if offset + len as u64 > self.total_length {
            return Err(SwarmError::StorageError(format!(
                "piece {} ({} bytes at offset {}) runs past end of file",
                index, len, offset
            )));
        }
        Ok(offset)
    }
}
