mod query_parsing;
