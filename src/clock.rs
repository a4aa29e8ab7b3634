use crate::message::MessageId;

/// A Lamport logical clock, owned by one node's ordering worker.
///
/// The clock only moves forward: every local event [ticks][LamportClock::tick]
/// it, and every received message pulls it past the sender's timestamp.
#[derive(Copy, Clone, Default, Debug)]
pub struct LamportClock {
    value: u64,
    origin: u32,
}

impl LamportClock {
    /// Create a clock at zero for the member at `origin` in the group.
    pub const fn new(origin: u32) -> Self {
        Self { value: 0, origin }
    }

    /// The current clock value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// This clock's member index, stamped into every ID it issues.
    #[inline]
    pub const fn origin(&self) -> u32 {
        self.origin
    }

    /// Advance the clock for a local event, returning the new value.
    #[inline]
    pub fn tick(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Account for a received message stamped `received`: the clock becomes
    /// one past the later of its own value and `received`.
    #[inline]
    pub fn observe(&mut self, received: u64) -> u64 {
        self.value = self.value.max(received).saturating_add(1);
        self.value
    }

    /// [Tick][LamportClock::tick] and stamp a fresh [`MessageId`], strictly
    /// greater than every ID this clock has issued or observed.
    pub fn next_id(&mut self) -> MessageId {
        MessageId::new(self.tick(), self.origin)
    }
}

#[cfg(test)]
mod test {
    use super::LamportClock;
    use crate::message::MessageId;

    #[test]
    fn test_tick() {
        let mut clock = LamportClock::new(2);
        assert_eq!(clock.value(), 0);

        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.next_id(), MessageId::new(3, 2));
        assert_eq!(clock.next_id(), MessageId::new(4, 2));
    }

    #[test]
    fn test_observe() {
        let mut clock = LamportClock::new(0);
        clock.tick();

        // a later remote clock pulls this one forward
        assert_eq!(clock.observe(10), 11);
        // an earlier one still advances it
        assert_eq!(clock.observe(3), 12);
        assert_eq!(clock.observe(12), 13);

        let id = clock.next_id();
        assert!(id > MessageId::new(12, 5));
        assert_eq!(id, MessageId::new(14, 0));
    }

    #[test]
    fn test_monotonic() {
        let mut clock = LamportClock::new(1);
        let mut last = clock.value();

        for received in [5, 0, 2, 100, 7, 100, 99] {
            let now = if received % 2 == 0 {
                clock.observe(received)
            } else {
                clock.tick()
            };
            assert!(now > last);
            last = now;
        }
    }
}
