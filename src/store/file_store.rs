// async-btree/src/store/file_store.rs

use std::fmt;
use std::io::SeekFrom;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::format::{
    decode_page, encode_page, Superblock, NULL_PAGE, SUPERBLOCK_SIZE, TAG_FREE, TAG_NODE,
    TAG_RESERVED, TAG_VALUE,
};
use super::node_store::NodeStore;
use crate::common::FileStoreConfig;
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::platform::{TreeKey, TreeValue};

struct FileStoreInner {
    file: File,
    superblock: Superblock,
    page_size: usize,
}

/// A `NodeStore` keeping every node and value record in its own fixed-size
/// page of a single file.
///
/// Page 0 holds the superblock (root page, page count, free-list head).
/// Removed pages are chained into a free list and handed out again by
/// `allocate`/`allocate_data`. All file access goes through one mutex, so
/// concurrent batches from the engines are applied one call at a time.
pub struct FileStore<K, V> {
    inner: Mutex<FileStoreInner>,
    path: PathBuf,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> fmt::Debug for FileStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl<K, V> FileStore<K, V> {
    /// Opens the store at `path`, creating an empty one if the file does
    /// not exist or is empty.
    pub async fn open(path: impl AsRef<Path>, config: FileStoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let len = file.metadata().await?.len();
        let (superblock, page_size) = if len == 0 {
            let superblock = Superblock::new(config.page_size as u32);
            write_superblock(&mut file, &superblock, config.page_size).await?;
            debug!("Created page file {:?} (page size {})", path, config.page_size);
            (superblock, config.page_size)
        } else {
            let mut bytes = vec![0u8; SUPERBLOCK_SIZE];
            file.seek(SeekFrom::Start(0)).await?;
            file.read_exact(&mut bytes).await?;
            let superblock = Superblock::read_from(&mut bytes.as_slice())?;
            let page_size = superblock.page_size as usize;
            FileStoreConfig { page_size }.validate().map_err(|err| {
                TreeError::InvalidFileFormat(format!("superblock of {:?}: {}", path, err))
            })?;
            if page_size != config.page_size {
                warn!(
                    "Page file {:?} uses page size {}, ignoring configured {}",
                    path, page_size, config.page_size
                );
            }
            debug!(
                "Opened page file {:?}: {} pages, root page {}",
                path, superblock.page_count, superblock.root_page
            );
            (superblock, page_size)
        };

        Ok(Self {
            inner: Mutex::new(FileStoreInner { file, superblock, page_size }),
            path,
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes file contents and metadata to disk.
    pub async fn sync(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.file.flush().await?;
        guard.file.sync_all().await?;
        Ok(())
    }

    /// Pages in the file, superblock included.
    pub async fn page_count(&self) -> u64 {
        self.inner.lock().await.superblock.page_count
    }
}

async fn write_superblock(file: &mut File, superblock: &Superblock, page_size: usize) -> Result<()> {
    let mut page = Vec::with_capacity(page_size);
    superblock.write_to(&mut page)?;
    page.resize(page_size, 0);
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(&page).await?;
    file.flush().await?;
    Ok(())
}

impl FileStoreInner {
    fn offset(&self, page_no: u64) -> u64 {
        page_no * self.page_size as u64
    }

    fn check_page(&self, page_no: u64) -> Result<()> {
        if page_no == NULL_PAGE || page_no >= self.superblock.page_count {
            return Err(TreeError::RecordNotFound(format!("page {}", page_no)));
        }
        Ok(())
    }

    async fn persist_superblock(&mut self) -> Result<()> {
        let superblock = self.superblock.clone();
        write_superblock(&mut self.file, &superblock, self.page_size).await
    }

    async fn read_page(&mut self, page_no: u64) -> Result<Vec<u8>> {
        self.check_page(page_no)?;
        let mut page = vec![0u8; self.page_size];
        let offset = self.offset(page_no);
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.read_exact(&mut page).await?;
        Ok(page)
    }

    async fn write_record(&mut self, page_no: u64, tag: u8, payload: &[u8]) -> Result<()> {
        self.check_page(page_no)?;
        let page = encode_page(tag, payload, self.page_size)?;
        let offset = self.offset(page_no);
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(&page).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Reads a record, insisting on the expected tag.
    async fn read_record(&mut self, page_no: u64, tag: u8) -> Result<Vec<u8>> {
        let page = self.read_page(page_no).await?;
        let (header, payload) = decode_page(&page, page_no)?;
        if header.tag != tag {
            return Err(TreeError::RecordNotFound(format!(
                "page {} holds tag {:#04x}, expected {:#04x}",
                page_no, header.tag, tag
            )));
        }
        Ok(payload.to_vec())
    }

    async fn allocate_page(&mut self) -> Result<u64> {
        let page_no = if self.superblock.free_head != NULL_PAGE {
            let page_no = self.superblock.free_head;
            let next = self.read_record(page_no, TAG_FREE).await?;
            if next.len() != 8 {
                return Err(TreeError::InvalidFileFormat(format!(
                    "free page {} has a {} byte link",
                    page_no,
                    next.len()
                )));
            }
            self.superblock.free_head = BigEndian::read_u64(&next);
            page_no
        } else {
            let page_no = self.superblock.page_count;
            self.superblock.page_count += 1;
            page_no
        };
        self.write_record(page_no, TAG_RESERVED, &[]).await?;
        self.persist_superblock().await?;
        Ok(page_no)
    }

    /// Returns a page to the free list. Freeing a free page is a no-op.
    async fn free_page(&mut self, page_no: u64) -> Result<()> {
        let page = self.read_page(page_no).await?;
        let (header, _) = decode_page(&page, page_no)?;
        if header.tag == TAG_FREE {
            return Ok(());
        }
        let mut link = [0u8; 8];
        BigEndian::write_u64(&mut link, self.superblock.free_head);
        self.write_record(page_no, TAG_FREE, &link).await?;
        self.superblock.free_head = page_no;
        if self.superblock.root_page == page_no {
            self.superblock.root_page = NULL_PAGE;
        }
        self.persist_superblock().await
    }
}

#[async_trait]
impl<K, V> NodeStore<K, V> for FileStore<K, V>
where
    K: TreeKey + Serialize + DeserializeOwned,
    V: TreeValue + Serialize + DeserializeOwned,
{
    type Id = u64;

    async fn get_root(&self) -> Result<Option<u64>> {
        let root = self.inner.lock().await.superblock.root_page;
        Ok((root != NULL_PAGE).then_some(root))
    }

    async fn write_root(&self, id: u64) -> Result<u64> {
        let mut guard = self.inner.lock().await;
        guard.check_page(id)?;
        guard.superblock.root_page = id;
        guard.persist_superblock().await?;
        Ok(id)
    }

    async fn clear_root(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.superblock.root_page = NULL_PAGE;
        guard.persist_superblock().await
    }

    async fn read(&self, id: &u64) -> Result<Node<u64, K>> {
        let payload = self.inner.lock().await.read_record(*id, TAG_NODE).await?;
        let mut node: Node<u64, K> = bincode::deserialize(&payload)?;
        node.id = Some(*id);
        Ok(node)
    }

    async fn write(&self, id: &u64, node: &Node<u64, K>) -> Result<u64> {
        let payload = bincode::serialize(node)?;
        self.inner.lock().await.write_record(*id, TAG_NODE, &payload).await?;
        Ok(*id)
    }

    async fn remove(&self, id: &u64) -> Result<()> {
        self.inner.lock().await.free_page(*id).await
    }

    async fn allocate(&self, _node: &Node<u64, K>) -> Result<u64> {
        self.inner.lock().await.allocate_page().await
    }

    async fn read_data(&self, id: &u64) -> Result<V> {
        let payload = self.inner.lock().await.read_record(*id, TAG_VALUE).await?;
        Ok(bincode::deserialize(&payload)?)
    }

    async fn write_data(&self, id: &u64, value: &V) -> Result<u64> {
        let payload = bincode::serialize(value)?;
        self.inner.lock().await.write_record(*id, TAG_VALUE, &payload).await?;
        Ok(*id)
    }

    async fn remove_data(&self, id: &u64) -> Result<()> {
        self.inner.lock().await.free_page(*id).await
    }

    async fn allocate_data(&self, _value: &V) -> Result<u64> {
        self.inner.lock().await.allocate_page().await
    }
}
