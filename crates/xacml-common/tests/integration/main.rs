mod test_config;
mod test_policy_document;
mod test_schema;
