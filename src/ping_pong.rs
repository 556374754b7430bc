/// Two equally-sized slots; one is current, the other receives the next write.
///
/// Readers only ever see [`PingPong::current`], which is the output of the
/// most recently completed tick. A tick borrows the current slot shared and
/// the other slot mutably, so the step cannot read what it is writing.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
    generation: u64,
}

impl<T> PingPong<T> {
    pub fn new(current: T, next: T) -> Self {
        Self { slots: [current, next], current: 0, generation: 0 }
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Completed ticks since construction.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn slot(&self, index: usize) -> &T {
        &self.slots[index & 1]
    }

    fn split(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        if self.current == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn swap(&mut self) {
        self.current ^= 1;
        self.generation += 1;
    }

    pub fn tick<R>(&mut self, step: impl FnOnce(&T, &mut T) -> R) -> R {
        let (read, write) = self.split();
        let out = step(read, write);
        self.swap();
        out
    }

    /// Like [`PingPong::tick`], but keeps the current slot when the step fails.
    pub fn try_tick<R, E>(&mut self, step: impl FnOnce(&T, &mut T) -> Result<R, E>) -> Result<R, E> {
        let (read, write) = self.split();
        let out = step(read, write)?;
        self.swap();
        Ok(out)
    }
}

impl<T: Clone> PingPong<T> {
    /// Both slots start from the same value.
    pub fn filled(seed: T) -> Self {
        Self::new(seed.clone(), seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_reads_previous_output() {
        let mut buffers = PingPong::filled(vec![0u32; 3]);
        for _ in 0..5 {
            buffers.tick(|read, write| {
                for (dst, src) in write.iter_mut().zip(read) {
                    *dst = src + 1;
                }
            });
        }
        assert_eq!(buffers.current(), &vec![5, 5, 5]);
        assert_eq!(buffers.generation(), 5);
        assert_eq!(buffers.current_index(), 1);
    }

    #[test]
    fn failed_step_does_not_swap() {
        let mut buffers = PingPong::new(1, 2);
        let result: Result<(), &str> = buffers.try_tick(|_, write| {
            *write = 99;
            Err("boom")
        });
        assert!(result.is_err());
        assert_eq!(*buffers.current(), 1);
        assert_eq!(buffers.generation(), 0);
    }
}
