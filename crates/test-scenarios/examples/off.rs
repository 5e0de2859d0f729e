#[mtrack::main]
fn main() {
    let block = mtrack::malloc!(16);
    println!("allocated: {}", !block.is_null());

    unsafe {
        let block = mtrack::realloc!(block, 32);
        mtrack::free!(block);
    }
}
