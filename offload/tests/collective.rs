mod collective {
    pub mod helpers;

    mod reduce;
    mod tree;
}
