#[mtrack::main]
fn main() {
    let name = mtrack::malloc!(10);
    println!("malloc: {:p}", name);

    let numbers = mtrack::calloc!(5, std::mem::size_of::<i32>()).cast::<i32>();
    println!("calloc: {:p}", numbers);

    let name = unsafe { mtrack::realloc!(name, 20) };
    println!("realloc: {:p}", name);

    unsafe {
        mtrack::free!(name);
        mtrack::free!(numbers);
    }
}
