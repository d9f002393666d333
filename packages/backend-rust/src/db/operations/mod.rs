mod memory_reviews;
mod memory_units;
