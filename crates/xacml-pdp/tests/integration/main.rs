mod fixtures;
mod test_file_store;
mod test_indexed_store;
mod test_pdp;
