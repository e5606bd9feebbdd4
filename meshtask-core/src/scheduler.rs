//! Strict round-robin worker selection, no fairness beyond cycling.

use meshtask_messages::Rank;
use meshtask_messages::FIRST_WORKER_RANK;

pub struct RoundRobin {
    world_size: u32,
    next: Rank,
}

impl RoundRobin {
    pub fn new(world_size: u32) -> Self {
        assert!(world_size > FIRST_WORKER_RANK, "need at least one worker rank");
        Self { world_size, next: FIRST_WORKER_RANK }
    }

    pub fn schedule_rank(&mut self) -> Rank {
        let rank = self.next;
        self.next = if self.next + 1 >= self.world_size { FIRST_WORKER_RANK } else { self.next + 1 };
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_worker_ranks() {
        let mut sched = RoundRobin::new(5);
        let picks: Vec<_> = (0..6).map(|_| sched.schedule_rank()).collect();
        assert_eq!(picks, vec![2, 3, 4, 2, 3, 4]);
    }

    #[test]
    fn single_worker_always_picked() {
        let mut sched = RoundRobin::new(3);
        assert_eq!(sched.schedule_rank(), 2);
        assert_eq!(sched.schedule_rank(), 2);
    }
}
