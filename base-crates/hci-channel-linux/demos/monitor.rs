//! Monitor example
//!
//! This opens a HCI channel to a Bluetooth adapter and prints every decoded event until the
//! example is sent a signal (e.g. by pressing ctrl-c). The public address of the adapter
//! (`XX:XX:XX:XX:XX:XX`) can be given as the only argument, otherwise the first adapter found is
//! used.
//!
//! # Note
//! Super User privileges (or the capability `CAP_NET_RAW`) are required for opening a raw HCI
//! socket.

use hci_channel::{BluetoothDeviceAddress, ChannelConfig};

fn parse_args(mut args: std::env::Args) -> Option<BluetoothDeviceAddress> {
    let program_name = args.next().unwrap();

    match args.next()?.parse() {
        Ok(address) => Some(address),
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: {} [adapter address]", program_name);
            std::process::exit(1);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    for adapter in hci_channel_linux::list_adapters().expect("cannot list the Bluetooth adapters") {
        println!("{}", adapter);
    }

    let config = ChannelConfig {
        adapter: parse_args(std::env::args()),
        ..Default::default()
    };

    let channel = hci_channel_linux::open_with(&config);

    let (task, mut events) = hci_channel_linux::spawn(channel).expect("failed to open the HCI channel");

    println!("awaiting for 'ctrl-C' (or SIGINT) to stop monitoring");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{:?}", event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    task.stop();
}
