mod fixtures;
mod test_enforcer;
mod test_search_filtering;
