use dfilter::{FieldRegistry, FilterCompiler};
use std::{env::args, process::exit};

fn main() {
    env_logger::init();

    let filter = match args().nth(1) {
        Some(filter) => filter,
        None => {
            eprintln!("Expected a filter as a command-line argument");
            exit(2);
        }
    };

    let registry = dfilter::Registry! {
        eth {
            eth.src: Ether,
            eth.dst: Ether,
        },
        ip {
            ip.addr: Ipv4,
            ip.ttl: Uint8,
        },
        tcp {
            tcp.port: Uint16,
            tcp.flags.syn: Boolean,
        },
        http {
            http.host: Bytes,
        },
    };

    match FilterCompiler::new(&registry).compile(&filter) {
        Ok(ast) => {
            for index in 0..registry.field_count() {
                let id = dfilter::FieldId::new(index as u32);
                if ast.uses(id) {
                    println!("# {} = {:?}", registry.abbrev(id).unwrap_or("?"), id);
                }
            }
            match serde_json::to_string_pretty(&ast) {
                Ok(json) => println!("{}", json),
                Err(err) => println!("{:#?} ({})", ast, err),
            }
        }
        Err(err) => {
            println!("{}", err);
            exit(1);
        }
    }
}
