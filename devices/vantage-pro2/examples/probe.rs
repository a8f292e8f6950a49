//! Manual bring-up aid: open a console over a CLI-supplied transport URL,
//! print firmware info, and dump one LOOP packet. Not part of the public API.

use bpaf::Bpaf;
use vantage_pro2::Console;

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options)]
struct Args {
    /// Transport URL, e.g. `serial:/dev/ttyUSB0:19200:8N1` or `tcp:localhost:1111`
    #[bpaf(long, short, fallback("serial:/dev/ttyUSB0:19200:8N1".to_string()))]
    url: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = args().run();

    let transport = vantage_pro2::parse_transport_url(&args.url)?;
    let mut console = Console::open(transport)?;

    println!("firmware date:    {}", console.firmware_date()?);
    println!("firmware version: {}", console.firmware_version()?);
    println!("archive period:   {} min", console.archive_period()?);
    println!("timezone:         {}", console.timezone()?);

    let reading = console.get_current_data()?;
    println!("{:#?}", reading.packet);

    Ok(())
}
