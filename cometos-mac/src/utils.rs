mod multi_class_queue;
mod stacked_array;

pub use multi_class_queue::MultiClassQueue;
pub use stacked_array::TriplexArray;
