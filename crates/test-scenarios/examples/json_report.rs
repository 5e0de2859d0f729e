#[mtrack::main(format = "json-pretty")]
fn main() {
    let kept = mtrack::malloc!(32);
    let dropped = mtrack::calloc!(4, 8);

    unsafe {
        let dropped = mtrack::realloc!(dropped, 64);
        mtrack::free!(dropped);
    }

    std::hint::black_box(kept);
}
