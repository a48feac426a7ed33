mod page_fault;

use eonix_mm::address::{Addr as _, AddrOps as _, PAddr, VAddr, VRange};
use eonix_mm::page_table::{PageAttribute, PageTableError, PTE};
use eonix_mm::paging::{FrameAlloc as _, PageAccess as _, PAGE_SIZE, PFN};

use super::{
    FramePool, PageMetadata, PageMetadataTable, PageState, PagingConfig, ReplacementPolicy,
    ResidencyQueue, SwapDevice, SwapSlot, SwapStore, UserPageTable, VmError, MAX_USER_VA,
};
use crate::prelude::*;

pub use page_fault::FaultKind;

const USER_PAGE_ATTR: PageAttribute = PageAttribute::READ
    .union(PageAttribute::WRITE)
    .union(PageAttribute::EXECUTE)
    .union(PageAttribute::USER);

/// The user part of the memory of one process.
///
/// Every user page below `size` is either resident in a frame of `frames`
/// or paged out to a slot of a swap store, and has an entry in `pages`
/// telling which. At most `config.resident_threshold` pages are resident at
/// any time and at most `config.total_budget` pages exist at all.
pub struct AddressSpace {
    pid: usize,
    config: PagingConfig,
    page_table: UserPageTable<FramePool, FramePool>,
    frames: FramePool,
    pages: PageMetadataTable,
    queue: ResidencyQueue,
    swap_device: Arc<dyn SwapDevice>,
    /// Created by the first eviction.
    swap: Option<Arc<SwapStore>>,
    size: usize,
    ticks: usize,
}

impl AddressSpace {
    pub fn new(
        pid: usize,
        config: PagingConfig,
        frames: FramePool,
        swap_device: Arc<dyn SwapDevice>,
    ) -> KResult<Self> {
        config.validate()?;

        let page_table = UserPageTable::new(frames.clone(), frames.clone())?;

        Ok(Self {
            pid,
            config,
            page_table,
            frames,
            pages: PageMetadataTable::new(config.total_budget),
            queue: ResidencyQueue::new(config.resident_threshold, config.total_budget),
            swap_device,
            swap: None,
            size: 0,
            ticks: 0,
        })
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.config.policy
    }

    pub fn resident_count(&self) -> usize {
        self.pages.resident()
    }

    pub fn swapped_count(&self) -> usize {
        self.pages.swapped()
    }

    pub fn swap_store(&self) -> Option<&Arc<SwapStore>> {
        self.swap.as_ref()
    }

    pub fn page(&self, vaddr: VAddr) -> Option<&PageMetadata> {
        let index = self.pages.find_by_address(vaddr.floor())?;
        Some(self.pages.get(index))
    }

    pub fn page_state(&self, vaddr: VAddr) -> PageState {
        self.page(vaddr)
            .map_or(PageState::Free, |page| page.state())
    }

    /// Grow or shrink the address space to `new_size` bytes.
    pub fn resize(&mut self, new_size: usize) -> KResult<usize> {
        if new_size > self.size {
            self.grow(new_size)
        } else {
            self.shrink(new_size)
        }
    }

    /// Add zeroed pages up to `new_size`, evicting older pages if needed.
    ///
    /// If any page can't be added, the pages added by this call are released
    /// again and the size stays the same. Pages evicted to make room stay
    /// evicted.
    pub fn grow(&mut self, new_size: usize) -> KResult<usize> {
        if new_size <= self.size {
            return Ok(self.size);
        }
        if new_size > MAX_USER_VA.addr() {
            return Err(VmError::InvalidArgument);
        }

        let start = VAddr::from(self.size).ceil();
        let end = VAddr::from(new_size).ceil();
        for page in VRange::new(start, end).pages() {
            if let Err(err) = self.admit_new_page(page) {
                println_debug!(
                    "pid {}: growing to {:#x} failed at {:?}: {}",
                    self.pid,
                    new_size,
                    page,
                    err
                );

                for added in VRange::new(start, page).pages() {
                    self.release_page(added).map_err(VmError::report)?;
                }
                return Err(err.report());
            }
        }

        self.size = new_size;
        Ok(new_size)
    }

    /// Release the pages above `new_size`.
    pub fn shrink(&mut self, new_size: usize) -> KResult<usize> {
        if new_size >= self.size {
            return Ok(self.size);
        }

        let range = VRange::new(VAddr::from(new_size).ceil(), VAddr::from(self.size).ceil());
        for page in range.pages() {
            self.release_page(page).map_err(VmError::report)?;
        }

        self.size = new_size;
        Ok(new_size)
    }

    fn admit_new_page(&mut self, vaddr: VAddr) -> KResult<()> {
        if !self.config.unmanaged {
            if self.pages.in_use() == self.config.total_budget {
                return Err(VmError::OutOfQuota);
            }

            if self.pages.resident() >= self.config.resident_threshold {
                if !self.config.policy.evicts() {
                    return Err(VmError::PagingDisabled);
                }
                self.evict_one(None)?;
            }
        }

        let pfn = self.frames.alloc().ok_or(VmError::OutOfMemory)?;
        unsafe {
            // SAFETY: The frame is freshly allocated and exclusively ours.
            self.frames.zero_frame(pfn);
        }

        if let Err(err) = self.page_table.map(vaddr, PAGE_SIZE, pfn, USER_PAGE_ATTR) {
            unsafe {
                // SAFETY: The frame never made it into the page table.
                self.frames.dealloc(pfn);
            }

            return Err(match err {
                PageTableError::TranslationUnavailable => VmError::OutOfMemory,
                err => err.into(),
            });
        }

        if self.config.unmanaged {
            return Ok(());
        }

        let index = self
            .pages
            .allocate(vaddr)
            .expect("A page within the budget should have a free metadata entry");
        self.queue.push_back(index);

        println_trace!(
            "trace_paging",
            "pid {}: admitted {:?} as page {}",
            self.pid,
            vaddr,
            index
        );

        Ok(())
    }

    /// Unmap one user page, resident or paged out, and forget about it.
    fn release_page(&mut self, vaddr: VAddr) -> KResult<()> {
        self.page_table.unmap(vaddr, 1, true)?;

        if let Some(index) = self.pages.find_by_address(vaddr) {
            self.pages.reset(index, &mut self.queue);
        }

        Ok(())
    }

    fn swap_store_or_create(&mut self) -> KResult<Arc<SwapStore>> {
        if let Some(store) = &self.swap {
            return Ok(store.clone());
        }

        let device = self.swap_device.clone();
        let store = SwapStore::create(device, self.pid, self.config.swap_slots)?;
        self.swap = Some(store.clone());
        Ok(store)
    }

    /// Move the page chosen by the replacement policy out to the swap store.
    ///
    /// The victim goes to `spare` if given, otherwise to a new slot of our
    /// store. Nothing is changed if the page can't be written out.
    fn evict_one(&mut self, spare: Option<SwapSlot>) -> KResult<()> {
        let victim = self
            .config
            .policy
            .select_victim(&mut self.pages, &mut self.queue, &mut self.page_table)
            .ok_or(VmError::NoVictim)?;

        let slot = match spare {
            Some(slot) => slot,
            None => self.swap_store_or_create()?.allocate()?,
        };
        let vaddr = self.pages.get(victim).vaddr();

        let entry = self
            .page_table
            .translate(vaddr, false)
            .map_err(|_| VmError::CorruptMapping)?;

        let (pfn, attr) = entry.get();
        if !attr.is_resident() {
            return Err(VmError::CorruptMapping);
        }

        slot.write(unsafe {
            // SAFETY: The page is mapped and we are the only one touching user memory.
            self.frames.frame_bytes(pfn)
        })?;

        let dropped = PageAttribute::VALID | PageAttribute::ACCESSED | PageAttribute::DIRTY;
        entry.set(PFN::from_val(0), (attr - dropped) | PageAttribute::PAGED_OUT);

        unsafe {
            // SAFETY: The entry doesn't point to the frame anymore.
            self.frames.dealloc(pfn);
        }

        println_trace!(
            "trace_swap",
            "pid {}: evicted {:?} to {:?}",
            self.pid,
            vaddr,
            slot
        );

        self.queue.remove(victim);
        self.pages.mark_swapped(victim, slot);

        Ok(())
    }

    /// Bring the paged out page at `vaddr` back into a frame.
    ///
    /// The page is read before a victim is chosen, so that the victim can
    /// take over its slot when every slot of the store is in use.
    fn page_in(&mut self, vaddr: VAddr) -> KResult<()> {
        let index = self
            .pages
            .find_by_address(vaddr)
            .unwrap_or_else(|| {
                panic!("pid {}: no metadata for paged out {:?}", self.pid, vaddr)
            });

        let attr = self
            .page_table
            .entry(vaddr)
            .map(|entry| entry.get_attr())
            .filter(|attr| attr.is_paged_out())
            .ok_or(VmError::CorruptMapping)?;

        let pfn = self.frames.alloc().ok_or(VmError::OutOfMemory)?;
        let slot = self
            .pages
            .get(index)
            .swap_slot()
            .expect("Swapped pages should own a swap slot")
            .clone();

        if let Err(err) = slot.read(unsafe {
            // SAFETY: The frame is freshly allocated and exclusively ours.
            self.frames.frame_bytes_mut(pfn)
        }) {
            unsafe {
                // SAFETY: Not mapped anywhere.
                self.frames.dealloc(pfn);
            }
            return Err(err);
        }

        if self.pages.resident() >= self.config.resident_threshold {
            // Our metadata and `slot` are the only references: nobody else
            // will read the old content.
            let spare = (slot.share_count() == 2).then(|| slot.clone());
            let reused = spare.is_some();

            if let Err(err) = self.evict_one(spare) {
                // A failed write may have clobbered our copy in the slot.
                let restored = if reused {
                    slot.write(unsafe {
                        // SAFETY: The frame is still exclusively ours.
                        self.frames.frame_bytes(pfn)
                    })
                } else {
                    Ok(())
                };

                unsafe {
                    // SAFETY: Not mapped anywhere.
                    self.frames.dealloc(pfn);
                }
                restored?;
                return Err(err);
            }
        }

        self.page_table
            .translate(vaddr, false)?
            .set(pfn, (attr - PageAttribute::PAGED_OUT) | PageAttribute::VALID);

        // A forked sibling might still hold the slot, only drop our reference.
        self.pages.mark_resident(index);
        self.queue.push_back(index);

        println_trace!(
            "trace_swap",
            "pid {}: paged in {:?} from {:?}",
            self.pid,
            vaddr,
            slot
        );
        drop(slot);

        Ok(())
    }

    /// Run one aging pass of the replacement policy.
    pub fn age_pages(&mut self) {
        self.config
            .policy
            .age(&mut self.pages, &self.queue, &mut self.page_table);
    }

    /// Called by the scheduler on every timer tick of this process.
    pub fn timer_tick(&mut self) {
        self.ticks += 1;
        if self.ticks % self.config.aging_interval == 0 {
            self.age_pages();
        }
    }

    /// Duplicate the address space for the child `child_pid`.
    ///
    /// Resident pages are copied into fresh frames. Paged out pages share
    /// their swap slot with us until one side pages it back in.
    pub fn fork(&self, child_pid: usize) -> KResult<Self> {
        let mut child = Self::new(
            child_pid,
            self.config,
            self.frames.clone(),
            self.swap_device.clone(),
        )?;

        self.page_table
            .copy_to(&mut child.page_table, self.size)
            .map_err(|err| VmError::from(err).report())?;

        child.pages = self.pages.clone();
        for index in self.queue.iter() {
            child.queue.push_back(index);
        }
        child.queue.set_hand(self.queue.hand());
        child.size = self.size;

        println_trace!(
            "trace_paging",
            "pid {}: forked into {} with {} resident and {} swapped pages",
            self.pid,
            child_pid,
            child.pages.resident(),
            child.pages.swapped()
        );

        Ok(child)
    }

    /// Release every user page, as on exec.
    pub fn clear_user(&mut self) -> KResult<()> {
        self.shrink(0)?;
        self.ticks = 0;
        Ok(())
    }

    /// Tear down the address space on exit.
    pub fn destroy(mut self) -> KResult<()> {
        self.clear_user()?;
        self.page_table
            .check_empty()
            .map_err(|err| VmError::from(err).report())?;

        Ok(())
    }

    /// Physical address of `vaddr` if it is a resident user page.
    pub fn walk_addr(&self, vaddr: VAddr) -> Option<PAddr> {
        if vaddr >= MAX_USER_VA {
            return None;
        }

        let (pfn, attr) = self.page_table.entry(vaddr.floor())?.get();
        if !attr.is_resident() || !attr.contains(PageAttribute::USER) {
            return None;
        }

        Some(PAddr::from(pfn) + vaddr.page_offset())
    }

    /// Find the frame of a user page for a kernel access, the way the MMU
    /// would: paged out pages are brought back and the accessed (and dirty)
    /// bits are set.
    fn user_frame(&mut self, vaddr: VAddr, write: bool) -> KResult<PFN> {
        if vaddr >= MAX_USER_VA {
            return Err(VmError::BadAddress);
        }

        let page = vaddr.floor();
        let attr = self
            .page_table
            .entry(page)
            .map(|entry| entry.get_attr())
            .ok_or(VmError::BadAddress)?;

        if attr.is_paged_out() {
            self.page_in(page)?;
        }

        let entry = self
            .page_table
            .translate(page, false)
            .map_err(|_| VmError::BadAddress)?;

        let (pfn, attr) = entry.get();
        if !attr.is_resident() || !attr.contains(PageAttribute::USER) {
            return Err(VmError::BadAddress);
        }
        if write && !attr.contains(PageAttribute::WRITE) {
            return Err(VmError::BadAddress);
        }

        let mut touched = attr | PageAttribute::ACCESSED;
        if write {
            touched |= PageAttribute::DIRTY;
        }
        entry.set_attr(touched);

        Ok(pfn)
    }

    /// Copy `src` to user memory at `dst`.
    pub fn copy_out(&mut self, dst: VAddr, src: &[u8]) -> KResult<()> {
        let (mut dst, mut src) = (dst, src);

        while !src.is_empty() {
            let pfn = self.user_frame(dst, true)?;
            let offset = dst.page_offset();
            let len = (PAGE_SIZE - offset).min(src.len());

            unsafe {
                // SAFETY: User pages are only accessed by the owning process.
                self.frames.frame_bytes_mut(pfn)[offset..offset + len]
                    .copy_from_slice(&src[..len]);
            }

            src = &src[len..];
            dst = dst + len;
        }

        Ok(())
    }

    /// Fill `dst` from user memory at `src`.
    pub fn copy_in(&mut self, dst: &mut [u8], src: VAddr) -> KResult<()> {
        let mut src = src;
        let mut copied = 0;

        while copied < dst.len() {
            let pfn = self.user_frame(src, false)?;
            let offset = src.page_offset();
            let len = (PAGE_SIZE - offset).min(dst.len() - copied);

            unsafe {
                // SAFETY: User pages are only accessed by the owning process.
                let bytes = &self.frames.frame_bytes(pfn)[offset..offset + len];
                dst[copied..copied + len].copy_from_slice(bytes);
            }

            copied += len;
            src = src + len;
        }

        Ok(())
    }

    /// Copy a NUL terminated string from user memory at `src` into `dst`.
    ///
    /// Returns the length of the string. The terminator is copied as well and
    /// must be found within `dst.len()` bytes.
    pub fn copy_in_str(&mut self, dst: &mut [u8], src: VAddr) -> KResult<usize> {
        let mut src = src;
        let mut copied = 0;

        while copied < dst.len() {
            let pfn = self.user_frame(src, false)?;
            let offset = src.page_offset();
            let len = (PAGE_SIZE - offset).min(dst.len() - copied);

            let bytes = unsafe {
                // SAFETY: User pages are only accessed by the owning process.
                &self.frames.frame_bytes(pfn)[offset..offset + len]
            };

            match bytes.iter().position(|&byte| byte == 0) {
                Some(nul) => {
                    dst[copied..=copied + nul].copy_from_slice(&bytes[..=nul]);
                    return Ok(copied + nul);
                }
                None => dst[copied..copied + len].copy_from_slice(bytes),
            }

            copied += len;
            src = src + len;
        }

        Err(VmError::BadAddress)
    }

    /// Make the page at `vaddr` inaccessible from user mode, e.g. for a stack
    /// guard page.
    pub fn clear_user_access(&mut self, vaddr: VAddr) -> KResult<()> {
        let entry = self
            .page_table
            .translate(vaddr.floor(), false)
            .map_err(|_| VmError::BadAddress)?;

        let attr = entry.get_attr();
        if attr.is_unmapped() {
            return Err(VmError::BadAddress);
        }

        entry.set_attr(attr - PageAttribute::USER);
        Ok(())
    }

    /// Load the image of the first process into page 0.
    pub fn load_initcode(&mut self, code: &[u8]) -> KResult<()> {
        if code.len() >= PAGE_SIZE || self.size != 0 {
            return Err(VmError::InvalidArgument);
        }

        self.grow(PAGE_SIZE)?;
        self.copy_out(VAddr::NULL, code)
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if let Err(err) = self.clear_user() {
            println_warn!("pid {}: leaking user pages: {}", self.pid, err);
        }
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::kernel::mem::{MemSwapDevice, SwapFile};
    use core::sync::atomic::{AtomicBool, Ordering};
    use eonix_mm::address::AddrOps as _;

    const FRAMES: usize = 64;
    /// Root table plus one table on each lower level for the first 2M.
    const TABLE_FRAMES: usize = 3;

    pub(in crate::kernel::mem) fn space(
        policy: ReplacementPolicy,
    ) -> (FramePool, Arc<MemSwapDevice>, AddressSpace) {
        let frames = FramePool::new(FRAMES);
        let device = MemSwapDevice::new();
        let space = AddressSpace::new(
            1,
            PagingConfig::new(policy),
            frames.clone(),
            device.clone(),
        )
        .unwrap();

        (frames, device, space)
    }

    #[derive(Default)]
    pub(in crate::kernel::mem) struct Faults {
        pub(in crate::kernel::mem) reads: AtomicBool,
        pub(in crate::kernel::mem) writes: AtomicBool,
    }

    struct FlakyDevice {
        inner: Arc<MemSwapDevice>,
        faults: Arc<Faults>,
    }

    struct FlakyFile {
        inner: Arc<dyn SwapFile>,
        faults: Arc<Faults>,
    }

    impl SwapDevice for FlakyDevice {
        fn create(&self, name: &str) -> KResult<Arc<dyn SwapFile>> {
            Ok(Arc::new(FlakyFile {
                inner: self.inner.create(name)?,
                faults: self.faults.clone(),
            }))
        }

        fn remove(&self, name: &str) -> KResult<()> {
            self.inner.remove(name)
        }
    }

    impl SwapFile for FlakyFile {
        fn read_at(&self, offset: usize, buf: &mut [u8]) -> KResult<usize> {
            if self.faults.reads.load(Ordering::Relaxed) {
                return Err(VmError::Io);
            }
            self.inner.read_at(offset, buf)
        }

        fn write_at(&self, offset: usize, buf: &[u8]) -> KResult<usize> {
            if self.faults.writes.load(Ordering::Relaxed) {
                return Err(VmError::Io);
            }
            self.inner.write_at(offset, buf)
        }
    }

    pub(in crate::kernel::mem) fn flaky_space(
        policy: ReplacementPolicy,
    ) -> (FramePool, Arc<Faults>, AddressSpace) {
        let frames = FramePool::new(FRAMES);
        let faults = Arc::new(Faults::default());
        let device = Arc::new(FlakyDevice {
            inner: MemSwapDevice::new(),
            faults: faults.clone(),
        });

        let space =
            AddressSpace::new(1, PagingConfig::new(policy), frames.clone(), device).unwrap();
        (frames, faults, space)
    }

    fn page(number: usize) -> VAddr {
        VAddr::from(number * PAGE_SIZE)
    }

    fn fill(space: &mut AddressSpace, pages: usize) {
        for number in 0..pages {
            space
                .copy_out(page(number), &[number as u8 + 1; PAGE_SIZE])
                .unwrap();
        }
    }

    fn read_page(space: &mut AddressSpace, number: usize) -> Vec<u8> {
        let mut buf = vec![0; PAGE_SIZE];
        space.copy_in(&mut buf, page(number)).unwrap();
        buf
    }

    fn check_budget(space: &AddressSpace) {
        assert!(space.resident_count() + space.swapped_count() <= 32);
        assert!(space.resident_count() <= 16);
        assert_eq!(
            space.resident_count() + space.swapped_count(),
            space.size().div_ceil(PAGE_SIZE)
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = PagingConfig {
            resident_threshold: 0,
            ..PagingConfig::default()
        };

        let result = AddressSpace::new(1, config, FramePool::new(4), MemSwapDevice::new());
        assert_eq!(result.err(), Some(VmError::InvalidArgument));
    }

    #[test]
    fn grow_within_threshold_needs_no_swap() {
        for policy in [
            ReplacementPolicy::None,
            ReplacementPolicy::NfuAging,
            ReplacementPolicy::Lapa,
            ReplacementPolicy::SecondChanceFifo,
        ] {
            let (frames, device, mut space) = space(policy);

            assert_eq!(space.grow(16 * PAGE_SIZE), Ok(16 * PAGE_SIZE));
            assert_eq!(space.resident_count(), 16);
            assert_eq!(space.swapped_count(), 0);
            assert!(space.swap_store().is_none());
            assert_eq!(device.file_count(), 0);
            assert_eq!(frames.free_frames(), FRAMES - TABLE_FRAMES - 16);
        }
    }

    #[test]
    fn first_eviction_creates_swap_store() {
        for policy in [
            ReplacementPolicy::NfuAging,
            ReplacementPolicy::Lapa,
            ReplacementPolicy::SecondChanceFifo,
        ] {
            let (_frames, device, mut space) = space(policy);
            space.grow(16 * PAGE_SIZE).unwrap();

            assert_eq!(space.grow(17 * PAGE_SIZE), Ok(17 * PAGE_SIZE));
            let store = space.swap_store().unwrap();
            assert!(store.name().starts_with("/.swap1."));
            assert!(device.exists(store.name()));
            assert_eq!(space.resident_count(), 16);
            assert_eq!(space.swapped_count(), 1);

            // Nothing was accessed, so every policy gives up the oldest page.
            assert_eq!(space.page_state(page(0)), PageState::Swapped);
            assert_eq!(space.page_state(page(16)), PageState::Resident);
            assert!(space.swap_store().unwrap().is_occupied(0));
        }
    }

    #[test]
    fn grow_rounds_partial_pages() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);

        assert_eq!(space.grow(100), Ok(100));
        assert_eq!(space.resident_count(), 1);
        assert_eq!(space.grow(200), Ok(200));
        assert_eq!(space.resident_count(), 1);
        assert_eq!(space.grow(PAGE_SIZE + 1), Ok(PAGE_SIZE + 1));
        assert_eq!(space.resident_count(), 2);
    }

    #[test]
    fn new_pages_are_zeroed() {
        let (frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(PAGE_SIZE).unwrap();
        fill(&mut space, 1);
        space.shrink(0).unwrap();
        assert_eq!(frames.free_frames(), FRAMES - TABLE_FRAMES);

        // The same frame comes back, but cleared.
        space.grow(PAGE_SIZE).unwrap();
        assert_eq!(read_page(&mut space, 0), vec![0; PAGE_SIZE]);
    }

    #[test]
    fn budget_exhaustion_changes_nothing() {
        let (frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(32 * PAGE_SIZE).unwrap();
        let free_frames = frames.free_frames();

        assert_eq!(space.grow(33 * PAGE_SIZE), Err(VmError::OutOfQuota));
        assert_eq!(space.size(), 32 * PAGE_SIZE);
        assert_eq!(space.resident_count(), 16);
        assert_eq!(space.swapped_count(), 16);
        assert_eq!(frames.free_frames(), free_frames);
    }

    #[test]
    fn no_policy_stops_at_threshold() {
        let (frames, device, mut space) = space(ReplacementPolicy::None);
        space.grow(16 * PAGE_SIZE).unwrap();
        let free_frames = frames.free_frames();

        let err = space.grow(18 * PAGE_SIZE).unwrap_err();
        assert_eq!(err, VmError::PagingDisabled);
        assert!(err.is_fatal());
        assert_eq!(space.size(), 16 * PAGE_SIZE);
        assert_eq!(space.resident_count(), 16);
        assert_eq!(frames.free_frames(), free_frames);
        assert_eq!(device.file_count(), 0);
    }

    #[test]
    fn unmanaged_space_grows_past_the_budget() {
        let frames = FramePool::new(FRAMES);
        let device = MemSwapDevice::new();
        let config = PagingConfig::for_pid(1, ReplacementPolicy::NfuAging);
        let mut space = AddressSpace::new(1, config, frames.clone(), device.clone()).unwrap();

        assert_eq!(space.grow(40 * PAGE_SIZE), Ok(40 * PAGE_SIZE));
        assert_eq!(frames.free_frames(), FRAMES - TABLE_FRAMES - 40);
        assert_eq!(space.resident_count(), 0);
        assert!(space.swap_store().is_none());
        assert_eq!(device.file_count(), 0);

        fill(&mut space, 40);
        assert_eq!(read_page(&mut space, 39), vec![40; PAGE_SIZE]);
        assert!(space.walk_addr(page(39)).is_some());
        assert_eq!(space.handle_page_fault(page(0), FaultKind::STORE), Ok(()));

        space.shrink(0).unwrap();
        assert_eq!(frames.free_frames(), FRAMES - TABLE_FRAMES);
    }

    #[test]
    fn budget_holds_across_resizes() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::Lapa);

        for size in [3, 20, 7, 32, 12, 33, 0, 25, 31, 1] {
            let _ = space.resize(size * PAGE_SIZE);
            check_budget(&space);
        }
    }

    #[test]
    fn failed_grow_rolls_back_added_pages() {
        let frames = FramePool::new(TABLE_FRAMES + 5);
        let mut space = AddressSpace::new(
            1,
            PagingConfig::default(),
            frames.clone(),
            MemSwapDevice::new(),
        )
        .unwrap();
        space.grow(2 * PAGE_SIZE).unwrap();

        assert_eq!(space.grow(10 * PAGE_SIZE), Err(VmError::OutOfMemory));
        assert_eq!(space.size(), 2 * PAGE_SIZE);
        assert_eq!(space.resident_count(), 2);
        assert_eq!(frames.free_frames(), 3);
        assert_eq!(space.page_state(page(2)), PageState::Free);
    }

    #[test]
    fn failed_swap_write_keeps_victim_resident() {
        let (frames, faults, mut space) = flaky_space(ReplacementPolicy::SecondChanceFifo);
        space.grow(16 * PAGE_SIZE).unwrap();
        let free_frames = frames.free_frames();

        faults.writes.store(true, Ordering::Relaxed);
        assert_eq!(space.grow(17 * PAGE_SIZE), Err(VmError::Io));
        assert_eq!(space.size(), 16 * PAGE_SIZE);
        assert_eq!(space.resident_count(), 16);
        assert_eq!(space.swapped_count(), 0);
        assert_eq!(space.page_state(page(0)), PageState::Resident);
        assert_eq!(space.swap_store().unwrap().used_slots(), 0);
        assert_eq!(frames.free_frames(), free_frames);
    }

    #[test]
    fn running_out_of_slots() {
        let frames = FramePool::new(FRAMES);
        let config = PagingConfig {
            swap_slots: 1,
            ..PagingConfig::default()
        };
        let mut space = AddressSpace::new(1, config, frames, MemSwapDevice::new()).unwrap();
        space.grow(17 * PAGE_SIZE).unwrap();

        assert_eq!(space.grow(19 * PAGE_SIZE), Err(VmError::NoSwapSpace));
        assert_eq!(space.size(), 17 * PAGE_SIZE);
        check_budget(&space);
    }

    #[test]
    fn rollback_releases_pages_evicted_in_the_same_call() {
        let frames = FramePool::new(FRAMES);
        let config = PagingConfig {
            swap_slots: 2,
            ..PagingConfig::default()
        };
        let mut space = AddressSpace::new(1, config, frames, MemSwapDevice::new()).unwrap();
        space.grow(16 * PAGE_SIZE).unwrap();
        for number in 0..16 {
            read_page(&mut space, number);
        }

        // Page 0 goes out first, then the untouched page 16. Page 18 finds no slot.
        assert_eq!(space.grow(19 * PAGE_SIZE), Err(VmError::NoSwapSpace));

        assert_eq!(space.size(), 16 * PAGE_SIZE);
        assert_eq!(space.page_state(page(0)), PageState::Swapped);
        assert_eq!(space.page_state(page(16)), PageState::Free);
        assert_eq!(space.page_state(page(17)), PageState::Free);

        let store = space.swap_store().unwrap();
        assert!(store.is_occupied(0));
        assert!(!store.is_occupied(1));
        check_budget(&space);
    }

    #[test]
    fn shrink_releases_swap_slots() {
        let (frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(17 * PAGE_SIZE).unwrap();
        let store = space.swap_store().unwrap().clone();
        let free_frames = frames.free_frames();

        // Page 0 is swapped, only the 16 resident pages give frames back.
        assert_eq!(space.shrink(0), Ok(0));
        assert_eq!(frames.free_frames(), free_frames + 16);
        assert!(!store.is_occupied(0));
        assert_eq!(space.resident_count(), 0);
        assert_eq!(space.swapped_count(), 0);
    }

    #[test]
    fn shrink_inside_last_page_keeps_it() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(2 * PAGE_SIZE).unwrap();

        assert_eq!(space.resize(PAGE_SIZE + 10), Ok(PAGE_SIZE + 10));
        assert_eq!(space.resident_count(), 2);
        assert_eq!(space.resize(PAGE_SIZE), Ok(PAGE_SIZE));
        assert_eq!(space.resident_count(), 1);
    }

    #[test]
    fn swapped_pages_come_back_intact() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::SecondChanceFifo);
        space.grow(16 * PAGE_SIZE).unwrap();
        fill(&mut space, 16);

        space.grow(24 * PAGE_SIZE).unwrap();
        assert_eq!(space.swapped_count(), 8);
        assert_eq!(space.page_state(page(7)), PageState::Swapped);

        for number in 0..16 {
            let expected = vec![number as u8 + 1; PAGE_SIZE];
            assert_eq!(read_page(&mut space, number), expected);
            check_budget(&space);
        }
    }

    #[test]
    fn nfu_spares_accessed_pages() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(16 * PAGE_SIZE).unwrap();
        for number in (0..16).filter(|&number| number != 5) {
            read_page(&mut space, number);
        }

        space.grow(17 * PAGE_SIZE).unwrap();
        assert_eq!(space.page_state(page(5)), PageState::Swapped);
    }

    #[test]
    fn clock_spares_accessed_pages() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::SecondChanceFifo);
        space.grow(16 * PAGE_SIZE).unwrap();
        for number in (0..16).filter(|&number| number != 3) {
            read_page(&mut space, number);
        }

        space.grow(17 * PAGE_SIZE).unwrap();
        assert_eq!(space.page_state(page(3)), PageState::Swapped);
    }

    #[test]
    fn lapa_prefers_rarely_used_pages() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::Lapa);
        space.grow(16 * PAGE_SIZE).unwrap();

        // Pages 1 to 15 were busy for a while some time ago, page 0 was
        // touched once just now. Its history has the larger value but fewer
        // bits set.
        for _ in 0..3 {
            for number in 1..16 {
                read_page(&mut space, number);
            }
            space.age_pages();
        }
        for _ in 0..4 {
            space.age_pages();
        }
        read_page(&mut space, 0);
        space.age_pages();

        assert_eq!(space.page(page(0)).unwrap().age(), 0x8000_0000);
        assert_eq!(space.page(page(1)).unwrap().age(), 0x0700_0000);

        space.grow(17 * PAGE_SIZE).unwrap();
        assert_eq!(space.page_state(page(0)), PageState::Swapped);
    }

    #[test]
    fn timer_ages_every_interval() {
        let frames = FramePool::new(FRAMES);
        let config = PagingConfig {
            aging_interval: 2,
            ..PagingConfig::default()
        };
        let mut space = AddressSpace::new(1, config, frames, MemSwapDevice::new()).unwrap();
        space.grow(PAGE_SIZE).unwrap();
        read_page(&mut space, 0);

        space.timer_tick();
        assert_eq!(space.page(page(0)).unwrap().age(), 0);
        space.timer_tick();
        assert_eq!(space.page(page(0)).unwrap().age(), 0x8000_0000);
        space.timer_tick();
        space.timer_tick();
        assert_eq!(space.page(page(0)).unwrap().age(), 0x4000_0000);
    }

    #[test]
    fn fork_copies_resident_pages() {
        let (frames, _device, mut parent) = space(ReplacementPolicy::NfuAging);
        parent.grow(2 * PAGE_SIZE).unwrap();
        fill(&mut parent, 2);

        let free_frames = frames.free_frames();
        let mut child = parent.fork(2).unwrap();
        assert_eq!(frames.free_frames(), free_frames - TABLE_FRAMES - 2);
        assert_eq!(child.size(), parent.size());
        assert_ne!(child.walk_addr(page(0)), parent.walk_addr(page(0)));

        assert_eq!(read_page(&mut child, 1), vec![2; PAGE_SIZE]);
        child.copy_out(page(1), b"child").unwrap();
        assert_eq!(read_page(&mut parent, 1), vec![2; PAGE_SIZE]);
    }

    #[test]
    fn forked_child_has_its_own_queue() {
        let (_frames, _device, mut parent) = space(ReplacementPolicy::NfuAging);
        parent.grow(16 * PAGE_SIZE).unwrap();

        let mut child = parent.fork(2).unwrap();
        child.shrink(8 * PAGE_SIZE).unwrap();

        assert_eq!(parent.queue.len(), 16);
        assert_eq!(child.queue.len(), 8);
        assert!(child
            .queue
            .iter()
            .all(|index| child.pages.get(index).state() == PageState::Resident));
    }

    #[test]
    fn swapped_pages_are_copied_on_first_fault() {
        let (_frames, device, mut parent) = space(ReplacementPolicy::NfuAging);
        parent.grow(16 * PAGE_SIZE).unwrap();
        fill(&mut parent, 16);
        parent.grow(17 * PAGE_SIZE).unwrap();
        assert_eq!(parent.page_state(page(0)), PageState::Swapped);

        let mut child = parent.fork(2).unwrap();
        let slot = child.page(page(0)).unwrap().swap_slot().unwrap().clone();
        assert_eq!(slot.share_count(), 3);

        // The child brings the page in and needs a store of its own for its victim.
        assert_eq!(read_page(&mut child, 0), vec![1; PAGE_SIZE]);
        let store = child.swap_store().unwrap();
        assert!(store.name().starts_with("/.swap2."));
        assert!(device.exists(store.name()));
        assert_eq!(slot.share_count(), 2);

        child.copy_out(page(0), b"child").unwrap();
        assert_eq!(read_page(&mut parent, 0), vec![1; PAGE_SIZE]);
    }

    #[test]
    fn reused_pid_leaves_the_child_swap_file_alone() {
        let (frames, device, mut parent) = space(ReplacementPolicy::NfuAging);
        parent.grow(16 * PAGE_SIZE).unwrap();
        fill(&mut parent, 16);
        parent.grow(17 * PAGE_SIZE).unwrap();

        let mut child = parent.fork(2).unwrap();
        drop(parent);

        let mut reborn =
            AddressSpace::new(1, PagingConfig::default(), frames, device.clone()).unwrap();
        reborn.grow(17 * PAGE_SIZE).unwrap();
        let name = String::from(reborn.swap_store().unwrap().name());
        assert_eq!(device.file_count(), 2);

        // The exited parent's store still backs the child's page 0.
        assert_eq!(read_page(&mut child, 0), vec![1; PAGE_SIZE]);
        drop(child);

        assert!(device.exists(&name));
        assert_eq!(device.file_count(), 1);
        assert_eq!(reborn.swap_store().unwrap().used_slots(), 1);
    }

    #[test]
    fn failed_fork_releases_everything() {
        let frames = FramePool::new(9);
        let mut parent = AddressSpace::new(
            1,
            PagingConfig::default(),
            frames.clone(),
            MemSwapDevice::new(),
        )
        .unwrap();
        parent.grow(2 * PAGE_SIZE).unwrap();

        assert_eq!(parent.fork(2).err(), Some(VmError::OutOfMemory));
        assert_eq!(frames.free_frames(), 4);
    }

    #[test]
    fn clear_user_keeps_swap_store() {
        let (frames, device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(20 * PAGE_SIZE).unwrap();

        space.clear_user().unwrap();
        assert_eq!(space.size(), 0);
        assert_eq!(frames.free_frames(), FRAMES - TABLE_FRAMES);
        assert_eq!(space.swap_store().unwrap().used_slots(), 0);
        assert!(device.exists(space.swap_store().unwrap().name()));
    }

    #[test]
    fn destroy_removes_swap_file() {
        let (frames, device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(20 * PAGE_SIZE).unwrap();
        let name = String::from(space.swap_store().unwrap().name());

        space.destroy().unwrap();
        assert_eq!(frames.free_frames(), FRAMES);
        assert!(!device.exists(&name));
    }

    #[test]
    fn dropping_releases_everything() {
        let (frames, device, mut space) = space(ReplacementPolicy::SecondChanceFifo);
        space.grow(20 * PAGE_SIZE).unwrap();

        drop(space);
        assert_eq!(frames.free_frames(), FRAMES);
        assert_eq!(device.file_count(), 0);
    }

    #[test]
    fn walk_addr_only_sees_resident_user_pages() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(17 * PAGE_SIZE).unwrap();

        let paddr = space.walk_addr(VAddr::from(PAGE_SIZE + 0x10)).unwrap();
        assert_eq!(paddr.page_offset(), 0x10);
        assert!(space.walk_addr(page(0)).is_none());
        assert!(space.walk_addr(page(17)).is_none());
        assert!(space.walk_addr(MAX_USER_VA).is_none());

        space.clear_user_access(page(1)).unwrap();
        assert!(space.walk_addr(page(1)).is_none());
    }

    #[test]
    fn copies_cross_page_boundaries() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(2 * PAGE_SIZE).unwrap();
        let data: Vec<u8> = (0..100).collect();

        space.copy_out(VAddr::from(PAGE_SIZE - 50), &data).unwrap();
        let mut buf = vec![0; 100];
        space.copy_in(&mut buf, VAddr::from(PAGE_SIZE - 50)).unwrap();
        assert_eq!(buf, data);

        assert_eq!(
            space.copy_out(VAddr::from(2 * PAGE_SIZE - 1), b"ab"),
            Err(VmError::BadAddress)
        );
    }

    #[test]
    fn copy_sets_accessed_and_dirty() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(2 * PAGE_SIZE).unwrap();

        space.copy_out(page(0), b"x").unwrap();
        read_page(&mut space, 1);

        let written = space.page_table.entry(page(0)).unwrap().get_attr();
        let read = space.page_table.entry(page(1)).unwrap().get_attr();
        assert!(written.contains(PageAttribute::ACCESSED | PageAttribute::DIRTY));
        assert!(read.contains(PageAttribute::ACCESSED));
        assert!(!read.contains(PageAttribute::DIRTY));
    }

    #[test]
    fn copy_in_str_stops_at_nul() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(2 * PAGE_SIZE).unwrap();
        space.copy_out(VAddr::from(PAGE_SIZE - 3), b"/init\0").unwrap();

        let mut buf = [0xff; 16];
        assert_eq!(space.copy_in_str(&mut buf, VAddr::from(PAGE_SIZE - 3)), Ok(5));
        assert_eq!(&buf[..6], b"/init\0");

        let mut short = [0; 4];
        assert_eq!(
            space.copy_in_str(&mut short, VAddr::from(PAGE_SIZE - 3)),
            Err(VmError::BadAddress)
        );
    }

    #[test]
    fn guard_page_rejects_user_copies() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        space.grow(2 * PAGE_SIZE).unwrap();
        space.clear_user_access(page(0)).unwrap();

        assert_eq!(space.copy_out(page(0), b"x"), Err(VmError::BadAddress));
        assert_eq!(space.clear_user_access(page(4)), Err(VmError::BadAddress));
    }

    #[test]
    fn initcode_lands_in_page_zero() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);
        let code = [0x13, 0x05, 0x00, 0x00];

        space.load_initcode(&code).unwrap();
        assert_eq!(space.size(), PAGE_SIZE);

        let mut buf = [0; 4];
        space.copy_in(&mut buf, VAddr::NULL).unwrap();
        assert_eq!(buf, code);

        assert_eq!(space.load_initcode(&code), Err(VmError::InvalidArgument));
    }

    #[test]
    fn oversized_initcode_is_rejected() {
        let (_frames, _device, mut space) = space(ReplacementPolicy::NfuAging);

        assert_eq!(
            space.load_initcode(&[0; PAGE_SIZE]),
            Err(VmError::InvalidArgument)
        );
        assert_eq!(space.size(), 0);
    }
}
