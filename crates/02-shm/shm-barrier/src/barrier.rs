//! The named process barrier.
//!
//! One shared region holds every primitive, laid out as a `#[repr(C)]`
//! header at the region base:
//!
//! ```text
//! +-----------+------------------+-------------+---------------+------------------+-----------+
//! | state u32 | pending_update   | query mutex | region rwlock | drained condvar  | n_queries |
//! +-----------+------------------+-------------+---------------+------------------+-----------+
//! ```
//!
//! All pthread objects are initialized `PTHREAD_PROCESS_SHARED`, so any
//! process mapping the region participates. The `state` word gates
//! initialization: the creator initializes the primitives and then stores
//! `READY`; late arrivals spin until they observe it.
//!
//! Lock order is `pending_update → query` on the publication path and
//! `region(shared) → query` on the query path; the exclusive region lock is
//! only ever taken after `pending_update` has been released. No cycle.

use crate::error::{check, BarrierError, BarrierResult};
use dataset_layout::Namespace;
use shm_region::{RegionError, WriteRegion};
use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const STATE_RAW: u32 = 0;
const STATE_READY: u32 = 2;

/// How long a late arrival waits for the creator to finish initialization.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[repr(C)]
struct BarrierShared {
    state: AtomicU32,
    _pad: u32,
    pending_update: libc::pthread_mutex_t,
    query: libc::pthread_mutex_t,
    region: libc::pthread_rwlock_t,
    queries_drained: libc::pthread_cond_t,
    number_of_queries: i64,
}

/// Initializes every primitive in place with process-shared attributes.
///
/// # Safety
///
/// `shared` must point at a zero-filled `BarrierShared` no other process is
/// using yet.
unsafe fn init_shared(shared: *mut BarrierShared) -> BarrierResult<()> {
    let mut mutex_attr: libc::pthread_mutexattr_t = unsafe { mem::zeroed() };
    unsafe {
        check(
            "pthread_mutexattr_init",
            libc::pthread_mutexattr_init(&mut mutex_attr),
        )?;
        check(
            "pthread_mutexattr_setpshared",
            libc::pthread_mutexattr_setpshared(&mut mutex_attr, libc::PTHREAD_PROCESS_SHARED),
        )?;
        check(
            "pthread_mutex_init",
            libc::pthread_mutex_init(ptr::addr_of_mut!((*shared).pending_update), &mutex_attr),
        )?;
        check(
            "pthread_mutex_init",
            libc::pthread_mutex_init(ptr::addr_of_mut!((*shared).query), &mutex_attr),
        )?;
        libc::pthread_mutexattr_destroy(&mut mutex_attr);
    }

    let mut rwlock_attr: libc::pthread_rwlockattr_t = unsafe { mem::zeroed() };
    unsafe {
        check(
            "pthread_rwlockattr_init",
            libc::pthread_rwlockattr_init(&mut rwlock_attr),
        )?;
        check(
            "pthread_rwlockattr_setpshared",
            libc::pthread_rwlockattr_setpshared(&mut rwlock_attr, libc::PTHREAD_PROCESS_SHARED),
        )?;
        check(
            "pthread_rwlock_init",
            libc::pthread_rwlock_init(ptr::addr_of_mut!((*shared).region), &rwlock_attr),
        )?;
        libc::pthread_rwlockattr_destroy(&mut rwlock_attr);
    }

    let mut cond_attr: libc::pthread_condattr_t = unsafe { mem::zeroed() };
    unsafe {
        check(
            "pthread_condattr_init",
            libc::pthread_condattr_init(&mut cond_attr),
        )?;
        check(
            "pthread_condattr_setpshared",
            libc::pthread_condattr_setpshared(&mut cond_attr, libc::PTHREAD_PROCESS_SHARED),
        )?;
        check(
            "pthread_cond_init",
            libc::pthread_cond_init(ptr::addr_of_mut!((*shared).queries_drained), &cond_attr),
        )?;
        libc::pthread_condattr_destroy(&mut cond_attr);
    }

    unsafe {
        (*shared).number_of_queries = 0;
    }
    Ok(())
}

/// Handle to the named barrier primitives of one namespace.
///
/// One handle per process, acquired at startup and threaded through
/// construction of loaders and readers. All methods take `&self`; the
/// primitives themselves serialize access.
#[derive(Debug)]
pub struct ProcessBarrier {
    shared: *mut BarrierShared,
    // Keeps the mapping (and therefore `shared`) alive.
    _view: WriteRegion,
}

// SAFETY: `shared` points into a MAP_SHARED mapping owned by `_view`; the
// pthread primitives it addresses are process-shared by construction and
// every access goes through them or the atomic state word.
unsafe impl Send for ProcessBarrier {}
// SAFETY: as above; `&self` methods only touch the region through the
// process-shared primitives.
unsafe impl Sync for ProcessBarrier {}

impl ProcessBarrier {
    /// Opens the namespace's barrier, creating and initializing the backing
    /// region on first use.
    pub fn open(namespace: &Namespace) -> BarrierResult<Self> {
        let name = namespace.barrier();
        let size = mem::size_of::<BarrierShared>() as u64;

        let deadline = Instant::now() + READY_TIMEOUT;
        let created = loop {
            match shm_region::open_or_create(&name, size) {
                Ok(created) => break created,
                // The creator is between shm_open and ftruncate.
                Err(RegionError::Unsized { .. }) => {
                    if Instant::now() >= deadline {
                        return Err(BarrierError::Unavailable {
                            reason: format!("{name} never got sized"),
                        });
                    }
                    thread::yield_now();
                }
                Err(err) => return Err(err.into()),
            }
        };

        let view = shm_region::attach_write(&name)?;
        let shared = view.as_mut_ptr() as *mut BarrierShared;

        if created {
            // SAFETY: freshly created regions are zero-filled and invisible
            // to peers until `state` flips to READY below.
            debug_assert_eq!(
                unsafe { &(*shared).state }.load(Ordering::Relaxed),
                STATE_RAW
            );
            unsafe { init_shared(shared)? };
            // SAFETY: `shared` stays valid while `view` is alive.
            unsafe { &(*shared).state }.store(STATE_READY, Ordering::Release);
            debug!(barrier = name, "initialized process barrier");
        } else {
            // SAFETY: as above; concurrent initialization is guarded by the
            // atomic state word.
            let state = unsafe { &(*shared).state };
            while state.load(Ordering::Acquire) != STATE_READY {
                if Instant::now() >= deadline {
                    return Err(BarrierError::Unavailable {
                        reason: format!("{name} exists but never became ready"),
                    });
                }
                thread::yield_now();
            }
        }

        Ok(Self {
            shared,
            _view: view,
        })
    }

    /// Removes the namespace's barrier region.
    ///
    /// Explicit teardown only; live handles keep working until dropped.
    pub fn unlink(namespace: &Namespace) -> BarrierResult<bool> {
        Ok(shm_region::remove(&namespace.barrier())?)
    }

    /// Acquires the pending-update mutex, serializing publications.
    ///
    /// Held from the moment a loader decides to publish until the registry
    /// swap is visible. A second loader blocks here.
    pub fn pending_update(&self) -> BarrierResult<PendingUpdateGuard<'_>> {
        // SAFETY: process-shared mutex initialized in `init_shared`.
        check("pthread_mutex_lock", unsafe {
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*self.shared).pending_update))
        })?;
        Ok(PendingUpdateGuard { barrier: self })
    }

    /// Acquires the short-lived query mutex.
    ///
    /// Protects the in-flight counter and brackets the registry write of a
    /// publication.
    pub fn lock_query(&self) -> BarrierResult<QueryLockGuard<'_>> {
        // SAFETY: process-shared mutex initialized in `init_shared`.
        check("pthread_mutex_lock", unsafe {
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*self.shared).query))
        })?;
        Ok(QueryLockGuard { barrier: self })
    }

    /// Registers one in-flight query: shared region lock plus counter
    /// increment. The returned ticket undoes both on drop, signalling the
    /// drained condition when the counter reaches zero.
    pub fn register_query(&self) -> BarrierResult<QueryTicket<'_>> {
        // SAFETY: process-shared rwlock initialized in `init_shared`.
        check("pthread_rwlock_rdlock", unsafe {
            libc::pthread_rwlock_rdlock(ptr::addr_of_mut!((*self.shared).region))
        })?;

        let counted = self.lock_query().map(|guard| {
            // SAFETY: counter is only touched under the query mutex.
            unsafe {
                (*self.shared).number_of_queries += 1;
            }
            drop(guard);
        });
        if let Err(err) = counted {
            // SAFETY: undo the rdlock taken above before surfacing the error.
            unsafe {
                libc::pthread_rwlock_unlock(ptr::addr_of_mut!((*self.shared).region));
            }
            return Err(err);
        }

        Ok(QueryTicket { barrier: self })
    }

    /// Blocks until no query is in flight.
    pub fn wait_until_drained(&self) -> BarrierResult<()> {
        let guard = self.lock_query()?;
        // SAFETY: counter and condvar are valid for the handle's lifetime;
        // the query mutex is held as pthread_cond_wait requires.
        unsafe {
            while (*self.shared).number_of_queries > 0 {
                check(
                    "pthread_cond_wait",
                    libc::pthread_cond_wait(
                        ptr::addr_of_mut!((*self.shared).queries_drained),
                        ptr::addr_of_mut!((*self.shared).query),
                    ),
                )?;
            }
        }
        drop(guard);
        Ok(())
    }

    /// Acquires the region lock exclusively; blocks until every shared
    /// holder (in-flight query) has released it.
    pub fn exclusive_region(&self) -> BarrierResult<RegionWriteGuard<'_>> {
        // SAFETY: process-shared rwlock initialized in `init_shared`.
        check("pthread_rwlock_wrlock", unsafe {
            libc::pthread_rwlock_wrlock(ptr::addr_of_mut!((*self.shared).region))
        })?;
        Ok(RegionWriteGuard { barrier: self })
    }

    /// Current in-flight query count.
    pub fn in_flight_queries(&self) -> BarrierResult<i64> {
        let guard = self.lock_query()?;
        // SAFETY: counter read under the query mutex.
        let count = unsafe { (*self.shared).number_of_queries };
        drop(guard);
        Ok(count)
    }
}

/// Holds the pending-update mutex; releases on drop.
pub struct PendingUpdateGuard<'a> {
    barrier: &'a ProcessBarrier,
}

impl Drop for PendingUpdateGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard holds the lock it releases.
        let _rc = unsafe {
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*self.barrier.shared).pending_update))
        };
        debug_assert_eq!(_rc, 0, "pending_update unlock failed: {}", os_error(_rc));
    }
}

/// Holds the query mutex; releases on drop.
pub struct QueryLockGuard<'a> {
    barrier: &'a ProcessBarrier,
}

impl Drop for QueryLockGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard holds the lock it releases.
        let _rc =
            unsafe { libc::pthread_mutex_unlock(ptr::addr_of_mut!((*self.barrier.shared).query)) };
        debug_assert_eq!(_rc, 0, "query unlock failed: {}", os_error(_rc));
    }
}

/// One registered in-flight query.
///
/// Dropping the ticket is the reader's exit protocol: decrement the counter
/// under the query mutex, signal the drained condition when it reaches zero,
/// then release the shared region lock. Release is deterministic on every
/// exit path, including panics unwinding through query code.
#[derive(Debug)]
pub struct QueryTicket<'a> {
    barrier: &'a ProcessBarrier,
}

impl Drop for QueryTicket<'_> {
    fn drop(&mut self) {
        let shared = self.barrier.shared;
        // SAFETY: ticket holders registered under the query mutex; the same
        // mutex protects the decrement and the condvar predicate.
        unsafe {
            let _rc = libc::pthread_mutex_lock(ptr::addr_of_mut!((*shared).query));
            debug_assert_eq!(_rc, 0, "query lock failed: {}", os_error(_rc));
            (*shared).number_of_queries -= 1;
            debug_assert!((*shared).number_of_queries >= 0, "query counter underflow");
            if (*shared).number_of_queries == 0 {
                libc::pthread_cond_broadcast(ptr::addr_of_mut!((*shared).queries_drained));
            }
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*shared).query));
            // SAFETY: this ticket holds the shared region lock it releases.
            libc::pthread_rwlock_unlock(ptr::addr_of_mut!((*shared).region));
        }
    }
}

/// Holds the region lock exclusively; releases on drop.
pub struct RegionWriteGuard<'a> {
    barrier: &'a ProcessBarrier,
}

impl Drop for RegionWriteGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: this guard holds the lock it releases.
        let _rc = unsafe {
            libc::pthread_rwlock_unlock(ptr::addr_of_mut!((*self.barrier.shared).region))
        };
        debug_assert_eq!(_rc, 0, "region unlock failed: {}", os_error(_rc));
    }
}

fn os_error(rc: libc::c_int) -> io::Error {
    io::Error::from_raw_os_error(rc)
}
