mod helpers;
mod traversal;
