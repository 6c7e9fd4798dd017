use crate::error::{KernelError, Result};
use crate::tensor::element::Element;
use crate::tensor::paging::PageFile;
use log::{trace, warn};
use std::cell::RefCell;
use std::path::Path;

/// Flat element storage behind a tensor. Reads take `&self` so inputs can be
/// shared while paged stores still refill their cache window.
pub trait ElementStore<T: Element> {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Result<T>;
    fn set(&mut self, index: usize, value: T) -> Result<()>;

    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Persist pending writes. A no-op for memory storage.
    fn sync(&mut self) -> Result<()> { Ok(()) }
}

fn out_of_range(index: usize, len: usize) -> KernelError {
    KernelError::IndexOutOfBounds { index: vec![index], shape: vec![len] }
}

impl<T: Element> ElementStore<T> for Vec<T> {
    #[inline]
    fn len(&self) -> usize { Vec::len(self) }

    #[inline]
    fn get(&self, index: usize) -> Result<T> {
        self.as_slice().get(index).copied().ok_or_else(|| out_of_range(index, Vec::len(self)))
    }

    #[inline]
    fn set(&mut self, index: usize, value: T) -> Result<()> {
        let len = Vec::len(self);
        match self.get_mut(index) {
            Some(slot) => { *slot = value; Ok(()) }
            None => Err(out_of_range(index, len)),
        }
    }
}

struct Window<T> {
    start: usize,
    data: Vec<T>,
    loaded: bool,
    dirty: bool,
}

/// File-backed storage caching one window of `capacity` elements in RAM.
///
/// Each miss writes back the current window if dirty and loads the aligned
/// window holding the requested index, so element access may block on I/O.
pub struct PagedStore<T: Element> {
    file: RefCell<PageFile>,
    len: usize,
    capacity: usize,
    window: RefCell<Window<T>>,
}

impl<T: Element> PagedStore<T> {
    /// Start a new page file of `len` zeroed elements.
    pub fn create<P: AsRef<Path>>(path: P, len: usize, capacity: usize) -> Result<Self> {
        let mut file = PageFile::create(path)?;
        file.set_len_elements::<T>(len)?;
        Ok(Self::with_file(file, len, capacity))
    }

    /// Page over an existing file that must hold at least `len` elements.
    pub fn open<P: AsRef<Path>>(path: P, len: usize, capacity: usize) -> Result<Self> {
        let file = PageFile::open(path)?;
        let have = file.len_bytes()? as usize;
        let need = len * T::SIZE;
        if have < need {
            return Err(KernelError::ShortTransfer { op: "open", expected: need, got: have });
        }
        Ok(Self::with_file(file, len, capacity))
    }

    /// Create a page file holding `values`, written window by window.
    pub fn from_slice<P: AsRef<Path>>(path: P, values: &[T], capacity: usize) -> Result<Self> {
        let mut store = Self::create(path, values.len(), capacity)?;
        let cap = store.capacity;
        {
            let file = store.file.get_mut();
            for (i, chunk) in values.chunks(cap).enumerate() {
                file.flush((i * cap) as u64, cap, chunk.len(), chunk)?;
            }
        }
        Ok(store)
    }

    fn with_file(file: PageFile, len: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            file: RefCell::new(file),
            len,
            capacity,
            window: RefCell::new(Window { start: 0, data: vec![T::default(); capacity], loaded: false, dirty: false }),
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    fn write_back(file: &mut PageFile, w: &mut Window<T>, len: usize, capacity: usize) -> Result<()> {
        if w.loaded && w.dirty {
            let count = (len - w.start).min(capacity);
            file.flush(w.start as u64, capacity, count, &w.data)?;
            w.dirty = false;
        }
        Ok(())
    }

    /// Make sure the window containing `index` is resident.
    fn fault_in(&self, index: usize) -> Result<()> {
        if index >= self.len {
            return Err(out_of_range(index, self.len));
        }
        let mut w = self.window.borrow_mut();
        if w.loaded && index >= w.start && index < w.start + self.capacity {
            return Ok(());
        }
        let mut file = self.file.borrow_mut();
        Self::write_back(&mut file, &mut w, self.len, self.capacity)?;
        let start = (index / self.capacity) * self.capacity;
        trace!("page miss at {}: window {}..", index, start);
        // Mark unloaded first so a failed read never leaves a stale window marked resident.
        w.loaded = false;
        file.load(start as u64, self.capacity, self.len - start, &mut w.data)?;
        w.start = start;
        w.loaded = true;
        Ok(())
    }
}

impl<T: Element> ElementStore<T> for PagedStore<T> {
    fn len(&self) -> usize { self.len }

    fn get(&self, index: usize) -> Result<T> {
        self.fault_in(index)?;
        let w = self.window.borrow();
        Ok(w.data[index - w.start])
    }

    fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.fault_in(index)?;
        let w = self.window.get_mut();
        let at = index - w.start;
        w.data[at] = value;
        w.dirty = true;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Self::write_back(self.file.get_mut(), self.window.get_mut(), self.len, self.capacity)
    }
}

impl<T: Element> Drop for PagedStore<T> {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!("page file {}: dropping unsaved window: {}", self.file.get_mut().path().display(), e);
        }
    }
}
