//! Splits a page of instructions into the serial queue and parallel batches.

use crate::instruction::ConvertInstruction;

/// Instructions of one page, grouped for execution.
#[derive(Debug, Default)]
pub struct FileQueues {
    /// Converters that must not run alongside others, in catalog order.
    pub sync_queue: Vec<ConvertInstruction>,
    /// Batches of at most `threads` instructions, each run concurrently.
    pub async_queues: Vec<Vec<ConvertInstruction>>,
}

impl FileQueues {
    pub fn len(&self) -> usize {
        self.sync_queue.len() + self.async_queues.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partitions `instructions`.
///
/// With one thread or fewer everything is serial. Otherwise parallel-safe
/// instructions fill batches of `threads` in order.
pub fn file_queues(instructions: Vec<ConvertInstruction>, threads: usize) -> FileQueues {
    let mut queues = FileQueues::default();
    let mut batch: Vec<ConvertInstruction> = Vec::new();

    for instruction in instructions {
        if threads <= 1 || !instruction.converter.parallel_safe() {
            queues.sync_queue.push(instruction);
            continue;
        }
        batch.push(instruction);
        if batch.len() == threads {
            queues.async_queues.push(std::mem::take(&mut batch));
        }
    }
    if !batch.is_empty() {
        queues.async_queues.push(batch);
    }

    queues
}
