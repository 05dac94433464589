#![forbid(unsafe_code)]

use clap::{Parser, Subcommand, ValueEnum};
use sigra::{EngineConfig, PlaceholderReservation, SignatureEngine, XadesRequest};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sigra", version, about = "Server-side XML signature engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign an XML document.
    Sign {
        /// Input document.
        #[arg(long)]
        input: PathBuf,
        /// PKCS#8 PEM private key.
        #[arg(long)]
        key: PathBuf,
        /// DER certificate(s), leaf first. Repeatable.
        #[arg(long, required = true)]
        cert: Vec<PathBuf>,
        /// Signature profile.
        #[arg(long, value_enum, default_value_t = Profile::Soap)]
        profile: Profile,
        /// Id attribute of the produced signature element.
        #[arg(long, default_value = "SIG-1")]
        signature_id: String,
        /// Id of the element to sign (xades profile only).
        #[arg(long)]
        target_id: Option<String>,
        /// Pad the output to a fixed byte size (xades profile only).
        #[arg(long)]
        reserve: Option<usize>,
        /// Output path; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    /// WS-Security signed SOAP envelope.
    Soap,
    /// Enveloped XAdES signature.
    Xades,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> sigra::Result<()> {
    match cli.command {
        Command::Sign {
            input,
            key,
            cert,
            profile,
            signature_id,
            target_id,
            reserve,
            output,
        } => {
            let xml = std::fs::read(&input)?;
            let key_pem = std::fs::read_to_string(&key)?;
            let mut chain = Vec::with_capacity(cert.len());
            for path in &cert {
                chain.push(std::fs::read(path)?);
            }
            let material = sigra::load_signing_material(&key_pem, chain)?;
            let engine = SignatureEngine::new(EngineConfig::default());

            let result = match profile {
                Profile::Soap => engine.sign_soap(&xml, &material, &signature_id)?,
                Profile::Xades => {
                    let target_id = target_id.ok_or_else(|| {
                        sigra::Error::InvalidInput(
                            "--target-id is required for the xades profile".into(),
                        )
                    })?;
                    engine.sign_xades(
                        &xml,
                        &material,
                        &XadesRequest {
                            signature_id: &signature_id,
                            target_id: &target_id,
                            fetcher: None,
                            reservation: reserve.map(PlaceholderReservation::new),
                        },
                    )?
                }
            };

            if let Some(warning) = &result.warning {
                eprintln!("warning: {warning}");
            }
            match output {
                Some(path) => std::fs::write(path, &result.document)?,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&result.document)?;
                }
            }
            Ok(())
        }
    }
}
