#[mtrack::main]
fn main() {
    unsafe {
        // double free
        let first = mtrack::malloc!(10);
        mtrack::free!(first);
        mtrack::free!(first);

        // free of a pointer into the middle of a block
        let offset = mtrack::malloc!(20).add(5);
        mtrack::free!(offset);

        // free of the pre-realloc pointer, then of the new one
        let before = mtrack::malloc!(10);
        let after = mtrack::realloc!(before, 50);
        mtrack::free!(before);
        mtrack::free!(after);

        // realloc of a block that was already released
        let released = mtrack::malloc!(8);
        mtrack::free!(released);
        let refused = mtrack::realloc!(released, 16);
        assert!(refused.is_null());

        // leaks
        let _buffer = mtrack::malloc!(100);
        let _table = mtrack::calloc!(10, 10);
    }
}
