use alloc::collections::btree_map::BTreeMap;
use alloc::format;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use eonix_mm::paging::PAGE_SIZE;
use spin::Mutex;

use super::VmError;
use crate::prelude::*;

/// A file on the backing device, addressed by byte offset.
pub trait SwapFile: Send + Sync {
    /// Read into `buf` from `offset`, returning the number of bytes read.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> KResult<usize>;

    /// Write `buf` at `offset`, returning the number of bytes written.
    fn write_at(&self, offset: usize, buf: &[u8]) -> KResult<usize>;
}

/// The device that holds the swap files of every process.
pub trait SwapDevice: Send + Sync {
    /// Create an empty file named `name`, replacing any existing one.
    fn create(&self, name: &str) -> KResult<Arc<dyn SwapFile>>;

    fn remove(&self, name: &str) -> KResult<()>;
}

/// Swap device keeping its files in kernel memory.
pub struct MemSwapDevice {
    files: Mutex<BTreeMap<String, Arc<MemSwapFile>>>,
}

struct MemSwapFile {
    data: Mutex<Vec<u8>>,
}

impl MemSwapDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }
}

impl SwapDevice for MemSwapDevice {
    fn create(&self, name: &str) -> KResult<Arc<dyn SwapFile>> {
        let file = Arc::new(MemSwapFile {
            data: Mutex::new(Vec::new()),
        });

        self.files.lock().insert(name.into(), file.clone());
        Ok(file)
    }

    fn remove(&self, name: &str) -> KResult<()> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or(VmError::Io)
    }
}

impl SwapFile for MemSwapFile {
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> KResult<usize> {
        let data = self.data.lock();
        let Some(available) = data.get(offset..) else {
            return Ok(0);
        };

        let len = buf.len().min(available.len());
        buf[..len].copy_from_slice(&available[..len]);
        Ok(len)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> KResult<usize> {
        let mut data = self.data.lock();
        let end = offset + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }

        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }
}

/// Page sized slots of one swap file.
///
/// Slots are handed out as [`SwapSlot`] handles that count references to the
/// slot, so a slot shared by a forked child stays occupied until both sides
/// are done with it. The file is removed from the device when the store goes
/// away.
pub struct SwapStore {
    device: Arc<dyn SwapDevice>,
    name: String,
    file: Arc<dyn SwapFile>,
    refcounts: Mutex<Box<[usize]>>,
}

/// A reference to an occupied slot of a [`SwapStore`].
pub struct SwapSlot {
    store: Arc<SwapStore>,
    index: usize,
}

impl SwapStore {
    /// Create the swap file `/.swap<pid>.<serial>` with `nr_slots` slots.
    ///
    /// A store can outlive its process through slots shared with a forked
    /// child, so the serial keeps a later process with a reused pid from
    /// replacing or removing the file.
    pub fn create(device: Arc<dyn SwapDevice>, pid: usize, nr_slots: usize) -> KResult<Arc<Self>> {
        static NEXT_SERIAL: AtomicUsize = AtomicUsize::new(0);

        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        let name = format!("/.swap{}.{}", pid, serial);
        let file = device.create(&name)?;

        println_trace!(
            "trace_swap",
            "swap: created {} with {} slots",
            name,
            nr_slots
        );

        Ok(Arc::new(Self {
            device,
            name,
            file,
            refcounts: Mutex::new(vec![0; nr_slots].into_boxed_slice()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.refcounts.lock().len()
    }

    pub fn used_slots(&self) -> usize {
        self.refcounts.lock().iter().filter(|&&count| count != 0).count()
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.refcounts.lock()[index] != 0
    }

    /// Take the first free slot.
    pub fn allocate(self: &Arc<Self>) -> KResult<SwapSlot> {
        let mut refcounts = self.refcounts.lock();
        let index = refcounts
            .iter()
            .position(|&count| count == 0)
            .ok_or(VmError::NoSwapSpace)?;

        refcounts[index] = 1;

        Ok(SwapSlot {
            store: self.clone(),
            index,
        })
    }

    fn check_slot(&self, slot: &SwapSlot) {
        assert!(
            core::ptr::eq(self, Arc::as_ptr(&slot.store)),
            "Slot {} belongs to another swap store",
            slot.index
        );
    }

    /// Write one page into `slot`.
    pub fn write(&self, slot: &SwapSlot, page: &[u8]) -> KResult<()> {
        assert_eq!(page.len(), PAGE_SIZE);
        self.check_slot(slot);

        match self.file.write_at(slot.offset(), page)? {
            PAGE_SIZE => Ok(()),
            _ => Err(VmError::Io),
        }
    }

    /// Read one page from `slot`.
    pub fn read(&self, slot: &SwapSlot, page: &mut [u8]) -> KResult<()> {
        assert_eq!(page.len(), PAGE_SIZE);
        self.check_slot(slot);

        match self.file.read_at(slot.offset(), page)? {
            PAGE_SIZE => Ok(()),
            _ => Err(VmError::Io),
        }
    }

    fn retain(&self, index: usize) {
        let mut refcounts = self.refcounts.lock();
        assert_ne!(refcounts[index], 0, "Retaining free swap slot {}", index);
        refcounts[index] += 1;
    }

    fn release(&self, index: usize) {
        let mut refcounts = self.refcounts.lock();
        match refcounts[index] {
            0 => panic!("Releasing free swap slot {}", index),
            count => refcounts[index] = count - 1,
        }
    }
}

impl Drop for SwapStore {
    fn drop(&mut self) {
        println_trace!("trace_swap", "swap: removing {}", self.name);

        if let Err(err) = self.device.remove(&self.name) {
            println_warn!("swap: failed to remove {}: {}", self.name, err);
        }
    }
}

impl SwapSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn offset(&self) -> usize {
        self.index * PAGE_SIZE
    }

    pub fn write(&self, page: &[u8]) -> KResult<()> {
        self.store.write(self, page)
    }

    pub fn read(&self, page: &mut [u8]) -> KResult<()> {
        self.store.read(self, page)
    }

    /// Number of handles referring to this slot.
    pub fn share_count(&self) -> usize {
        self.store.refcounts.lock()[self.index]
    }
}

impl Clone for SwapSlot {
    fn clone(&self) -> Self {
        self.store.retain(self.index);

        Self {
            store: self.store.clone(),
            index: self.index,
        }
    }
}

impl Drop for SwapSlot {
    fn drop(&mut self) {
        self.store.release(self.index);
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({}#{})", self.store.name, self.index)
    }
}
