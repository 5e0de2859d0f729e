fn load_config() -> *mut u8 {
    mtrack::malloc!(100)
}

fn load_index() -> *mut u32 {
    mtrack::calloc!(10, std::mem::size_of::<u32>()).cast()
}

fn scratch() {
    let scratch = mtrack::malloc!(64);
    unsafe { mtrack::free!(scratch) };
}

#[mtrack::main]
fn main() {
    let config = load_config();
    let index = load_index();
    scratch();

    println!("config: {:p}, index: {:p}", config, index);
}
