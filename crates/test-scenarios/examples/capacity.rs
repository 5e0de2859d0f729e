#[mtrack::main(capacity = 4)]
fn main() {
    let blocks: Vec<*mut u8> = (0..6).map(|i| mtrack::malloc!(16 * (i + 1))).collect();

    for block in blocks {
        unsafe { mtrack::free!(block) };
    }
}
