fn main() {
    mtrack::GuardBuilder::new("at_exit::main")
        .install_at_exit()
        .expect("atexit registration");

    let _leaked = mtrack::malloc!(42);
    let freed = mtrack::malloc!(8);
    unsafe { mtrack::free!(freed) };

    std::process::exit(0);
}
