use clap::Parser;
use joycon::thread::{finish, joycon::JoyconDriver};

fn main() -> ! {
    env_logger::init();
    finish("joycon", JoyconDriver::parse().run())
}
