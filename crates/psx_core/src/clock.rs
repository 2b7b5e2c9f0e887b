//! The clock drives every device that needs to run by itself, like the GPU advancing
//! scanlines. The CPU and DMA report how many CPU cycles they have spent, which moves system
//! time forward, and every device whose next update is due gets called with the amount of its
//! own cycles that passed since its last update.
//!
//! Devices are kept in a min-heap keyed by their next update, so a tick where nothing is due is
//! just a comparison against the top of the heap.

use crate::time::SysTime;

use std::collections::BinaryHeap;
use std::cmp::Ordering;
use std::thread;
use std::time::Instant;

/// The frequency of the CPU and therefore the master clock.
pub const CPU_HZ: f64 = 33_868_800.0;

/// The maximum number of devices that can be added to a [`Clock`].
pub const MAX_DEVICES: usize = 10;

/// The update frequency of a device that hasn't set one.
const DEFAULT_UPDATE_FREQUENCY: SysTime = SysTime::from_nanos(1_000_000_000 / 60);

/// A device driven by the clock. The only thing the clock needs to know is how long each of its
/// cycles are.
#[derive(Debug, Clone, Copy)]
pub struct ClockDevice {
    nanos_per_cycle: SysTime,
}

impl ClockDevice {
    /// A device running at `hz`.
    pub fn new(hz: f64) -> Self {
        Self::with_period(SysTime::period_of(hz))
    }

    pub fn with_period(nanos_per_cycle: SysTime) -> Self {
        Self { nanos_per_cycle }
    }
}

/// Handle to a device added to a [`Clock`]. It stays valid for the lifetime of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockHandle(usize);

impl ClockHandle {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

struct Entry {
    device: ClockDevice,
    /// When the device should be updated next.
    next_update: SysTime,
    /// The time between regular updates.
    update_frequency: SysTime,
    last_update: SysTime,
}

/// Entry in the update queue. An entry is stale if the device has been rescheduled since it was
/// pushed, in which case its time doesn't match [`Entry::next_update`] and it's skipped.
struct QueueEntry(SysTime, ClockHandle);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Sort earliest to latest, ties by order of registration.
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0).then_with(|| other.1.0.cmp(&self.1.0))
    }
}

/// Reference point for pacing emulation to wall-clock time.
struct Realtime {
    instant: Instant,
    system_time: SysTime,
}

pub struct Clock {
    /// The length of a master clock cycle.
    master_period: SysTime,
    /// Emulated time since startup.
    system_time: SysTime,
    entries: Vec<Entry>,
    queue: BinaryHeap<QueueEntry>,
    realtime: Realtime,
}

impl Clock {
    pub fn new() -> Self {
        Self::with_master_period(SysTime::period_of(CPU_HZ))
    }

    pub fn with_master_period(master_period: SysTime) -> Self {
        Self {
            master_period,
            system_time: SysTime::ZERO,
            entries: Vec::with_capacity(MAX_DEVICES),
            queue: BinaryHeap::with_capacity(MAX_DEVICES * 2),
            realtime: Realtime {
                instant: Instant::now(),
                system_time: SysTime::ZERO,
            },
        }
    }

    /// Emulated time since startup.
    pub fn system_time(&self) -> SysTime {
        self.system_time
    }

    /// Add a device to be updated. It starts out being updated at the default frequency of 60
    /// times a second.
    ///
    /// # Panics
    ///
    /// If [`MAX_DEVICES`] devices have already been added.
    pub fn add_device(&mut self, device: ClockDevice) -> ClockHandle {
        if self.entries.len() >= MAX_DEVICES {
            panic!("clock can't drive more than {MAX_DEVICES} devices");
        }
        let handle = ClockHandle(self.entries.len());
        let next_update = self.system_time + DEFAULT_UPDATE_FREQUENCY;
        self.entries.push(Entry {
            device,
            next_update,
            update_frequency: DEFAULT_UPDATE_FREQUENCY,
            last_update: self.system_time,
        });
        self.queue.push(QueueEntry(next_update, handle));
        handle
    }

    /// Set how many of the device's cycles there are between regular updates. If the next
    /// update would be sooner with the new frequency it's moved forward.
    pub fn set_default_update_frequency(&mut self, handle: ClockHandle, cycles: u32) {
        let entry = &mut self.entries[handle.0];
        // A frequency of zero would make the device due forever.
        let frequency = entry.device.nanos_per_cycle * u64::from(cycles.max(1));
        entry.update_frequency = frequency;
        self.schedule_before(handle, self.system_time.saturating_add(frequency));
    }

    /// Request a single update in `cycles` of the device's cycles, unless it's already going to
    /// be updated before then.
    pub fn request_update(&mut self, handle: ClockHandle, cycles: u32) {
        let entry = &self.entries[handle.0];
        let at = self.system_time.saturating_add(entry.device.nanos_per_cycle * u64::from(cycles));
        self.schedule_before(handle, at);
    }

    /// The number of the device's cycles until it's going to be updated.
    #[cfg(test)]
    pub(crate) fn cycles_to_next_update(&self, handle: ClockHandle) -> u64 {
        let entry = &self.entries[handle.0];
        entry.next_update
            .saturating_sub(self.system_time)
            .periods(entry.device.nanos_per_cycle)
    }

    fn schedule_before(&mut self, handle: ClockHandle, at: SysTime) {
        let entry = &mut self.entries[handle.0];
        if at < entry.next_update {
            entry.next_update = at;
            self.queue.push(QueueEntry(at, handle));
        }
    }

    /// Pop the next device which is due for an update and reschedule it for its next regular
    /// update. Returns the handle and the amount of the device's cycles since its last update.
    fn pop_due(&mut self) -> Option<(ClockHandle, u32)> {
        while let Some(top) = self.queue.peek() {
            if top.0 > self.system_time {
                return None;
            }
            let QueueEntry(at, handle) = self.queue.pop()?;
            let now = self.system_time;
            let entry = &mut self.entries[handle.0];
            if at != entry.next_update {
                continue;
            }
            let elapsed = (now - entry.last_update).periods(entry.device.nanos_per_cycle);
            // Never reschedule at the current time, or the device would be due forever.
            let step = entry.update_frequency.max(entry.device.nanos_per_cycle).max(self.master_period);
            entry.last_update = now;
            entry.next_update = now.saturating_add(step);
            self.queue.push(QueueEntry(entry.next_update, handle));
            return Some((handle, elapsed.min(u64::from(u32::MAX)) as u32));
        }
        None
    }

    /// Move `cycles` master cycles forward and run every device that is due. `update` is called
    /// in order of when each device was due, with the clock itself so the device can reschedule
    /// itself.
    pub fn tick(&mut self, cycles: u32, mut update: impl FnMut(&mut Clock, ClockHandle, u32)) {
        self.system_time = self.system_time.saturating_add(self.master_period * u64::from(cycles));
        while let Some((handle, elapsed)) = self.pop_due() {
            update(self, handle, elapsed);
        }
    }

    /// Sleep if emulation is running ahead of the host since the last sync. Falling behind is
    /// never made up for.
    pub fn sync_to_realtime(&mut self) {
        let emulated = self.system_time.saturating_sub(self.realtime.system_time).as_duration();
        let elapsed = self.realtime.instant.elapsed();
        if let Some(ahead) = emulated.checked_sub(elapsed) {
            thread::sleep(ahead);
        } else {
            trace!("emulation behind by {:?}", elapsed - emulated);
        }
        self.reset_realtime();
    }

    /// Forget the time since the last sync, for instance after the emulator has been paused.
    pub fn reset_realtime(&mut self) {
        self.realtime = Realtime {
            instant: Instant::now(),
            system_time: self.system_time,
        };
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nanos(n: u64) -> SysTime {
        SysTime::from_nanos(n)
    }

    fn nano_clock() -> Clock {
        Clock::with_master_period(nanos(1))
    }

    #[test]
    fn updates_in_order() {
        let mut clock = nano_clock();
        let fast = clock.add_device(ClockDevice::with_period(nanos(1)));
        let slow = clock.add_device(ClockDevice::with_period(nanos(1)));

        clock.set_default_update_frequency(fast, 100);
        clock.set_default_update_frequency(slow, 250);

        let mut fired = Vec::new();
        for _ in 0..26 {
            clock.tick(10, |clock, handle, cycles| {
                fired.push((handle, cycles, clock.system_time().as_nanos()));
            });
        }

        assert_eq!(clock.system_time().as_nanos(), 260);
        assert_eq!(fired, vec![(fast, 100, 100), (fast, 100, 200), (slow, 250, 250)]);
    }

    #[test]
    fn device_cycles_scale_with_period() {
        let mut clock = nano_clock();
        let dev = clock.add_device(ClockDevice::with_period(nanos(2)));
        clock.set_default_update_frequency(dev, 50);

        let mut got = 0;
        clock.tick(100, |_, _, cycles| got = cycles);
        assert_eq!(got, 50);
        assert_eq!(clock.cycles_to_next_update(dev), 50);
    }

    #[test]
    fn request_update_only_moves_forward() {
        let mut clock = nano_clock();
        let dev = clock.add_device(ClockDevice::with_period(nanos(1)));
        clock.set_default_update_frequency(dev, 1000);

        clock.request_update(dev, 2000);
        assert_eq!(clock.cycles_to_next_update(dev), 1000);

        clock.request_update(dev, 30);
        assert_eq!(clock.cycles_to_next_update(dev), 30);

        let mut count = 0;
        clock.tick(30, |_, _, _| count += 1);
        assert_eq!(count, 1);

        // Back to the regular frequency after the one-shot update.
        assert_eq!(clock.cycles_to_next_update(dev), 1000);
    }

    #[test]
    fn update_can_request_another() {
        let mut clock = nano_clock();
        let dev = clock.add_device(ClockDevice::with_period(nanos(1)));
        clock.set_default_update_frequency(dev, 100);

        let mut times = Vec::new();
        for _ in 0..15 {
            clock.tick(10, |clock, handle, _| {
                times.push(clock.system_time().as_nanos());
                if times.len() == 1 {
                    clock.request_update(handle, 20);
                }
            });
        }
        assert_eq!(times, vec![100, 120]);
    }

    #[test]
    fn runs_past_u64_nanos() {
        let mut clock = Clock::with_master_period(nanos(u64::MAX / 2));
        clock.add_device(ClockDevice::with_period(nanos(1)));

        let mut count = 0;
        clock.tick(4, |_, _, cycles| {
            count += 1;
            assert_eq!(cycles, u32::MAX);
        });
        assert_eq!(count, 1);
        assert!(clock.system_time() > nanos(u64::MAX));

        clock.tick(1, |_, _, _| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    #[should_panic]
    fn too_many_devices() {
        let mut clock = nano_clock();
        for _ in 0..=MAX_DEVICES {
            clock.add_device(ClockDevice::with_period(nanos(1)));
        }
    }
}
