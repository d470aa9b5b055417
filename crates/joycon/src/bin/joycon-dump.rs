use clap::Parser;
use joycon::thread::{dump::JoyconDump, finish};

fn main() -> ! {
    env_logger::init();
    finish("joycon-dump", JoyconDump::parse().run())
}
