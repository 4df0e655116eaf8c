// SPDX-License-Identifier: AGPL-3.0-only

//! Host execution of the kernel contract.
//!
//! [`run`] is what the host device calls for every dispatch: it picks the
//! gauge group from the program's configuration and routes the kernel and
//! its argument buffers to the implementation below.

pub mod cpu_check;
pub mod field;
pub mod init;
pub mod measure;
pub mod orthogonalize;
pub mod reduce;
pub mod update;
pub mod wilson;

use crate::error::{QcdError, Result};
use crate::group::su2::Su2;
use crate::group::su3::Su3Matrix;
use crate::group::GaugeGroup;

use super::{KernelConfig, KernelName};

/// Run `kernel` of the program configured by `cfg` on `args`.
///
/// # Errors
///
/// [`QcdError::KernelRun`] if the argument count or buffer sizes do not
/// match the contract, or a constant is out of range.
pub fn run(
    cfg: &KernelConfig,
    kernel: KernelName,
    constants: [u32; 4],
    args: &mut [Vec<f64>],
) -> Result<()> {
    match cfg.group {
        2 => run_group::<Su2>(cfg, kernel, constants, args),
        3 => run_group::<Su3Matrix>(cfg, kernel, constants, args),
        g => Err(QcdError::KernelRun {
            kernel: kernel.to_string(),
            reason: format!("no host kernels for SU({g})"),
        }),
    }
}

fn run_group<G: GaugeGroup>(
    cfg: &KernelConfig,
    kernel: KernelName,
    constants: [u32; 4],
    args: &mut [Vec<f64>],
) -> Result<()> {
    let fail = |reason: String| QcdError::KernelRun {
        kernel: kernel.to_string(),
        reason,
    };
    let need = |buf: &[f64], len: usize, what: &str| {
        if buf.len() < len {
            Err(fail(format!("{what} holds {} words, need {len}", buf.len())))
        } else {
            Ok(())
        }
    };
    let nargs = args.len();
    if nargs != kernel.arity() {
        return Err(fail(format!("expected {} buffers, got {nargs}", kernel.arity())));
    }
    let links_len = cfg.links_len();
    let measurement_len = cfg.measurement_len();
    let owned = cfg.local.owned_sites();
    let constant0 = constants[0] as usize;

    match args {
        [links] => {
            need(links, links_len, "links")?;
            match kernel {
                KernelName::InitCold => init::cold::<G>(cfg, links),
                KernelName::InitGid => init::gid::<G>(cfg, links),
                KernelName::Orthogonalize => orthogonalize::orthogonalize::<G>(&mut links[..links_len]),
                _ => return Err(fail("unexpected single-buffer kernel".into())),
            }
        }
        [a, b] => match kernel {
            KernelName::InitHot => {
                need(a, links_len, "links")?;
                need(b, owned * cfg.local.nd() * G::WORDS, "prns")?;
                init::hot::<G>(cfg, a, b);
            }
            KernelName::UpdateOdd | KernelName::UpdateEven => {
                need(a, links_len, "links")?;
                need(b, owned / 2 * crate::group::heat_bath_uniforms(G::SUBGROUPS, cfg.nhit), "prns")?;
                if constant0 >= cfg.local.nd() {
                    return Err(fail(format!("direction {constant0} out of range")));
                }
                let parity = usize::from(kernel == KernelName::UpdateOdd);
                update::update::<G>(cfg, a, b, constant0, parity);
            }
            KernelName::WilsonLt => {
                need(a, links_len, "links")?;
                need(b, owned * G::WORDS, "lt")?;
                wilson::lt::<G>(cfg, a, b);
            }
            k if k.is_reduction() => {
                need(a, measurement_len, "measurement")?;
                reduce::reduce(cfg, k, a, b, constant0)?;
            }
            primary => {
                need(a, links_len, "links")?;
                need(b, measurement_len, "measurement")?;
                match primary {
                    KernelName::Plaquette => measure::plaquette::<G>(cfg, a, b),
                    KernelName::Action => measure::action::<G>(cfg, a, b),
                    KernelName::ActionDiff(k) => measure::action_diff::<G>(cfg, a, b, k),
                    KernelName::Polyakov => measure::polyakov::<G>(cfg, a, b),
                    KernelName::PolyakovDiff(k) => measure::polyakov_diff::<G>(cfg, a, b, k),
                    _ => return Err(fail("unexpected two-buffer kernel".into())),
                }
            }
        },
        [links, aux_links, lr] => {
            need(links, links_len, "links")?;
            need(lr, cfg.chain_len(), "chain")?;
            if cfg.local.halo {
                need(aux_links, cfg.aux_len(), "aux_links")?;
            }
            let shift = match kernel {
                KernelName::WilsonLr1 => 0,
                KernelName::WilsonLr2 => cfg.wilson_t,
                _ => return Err(fail("unexpected three-buffer kernel".into())),
            };
            wilson::chain::<G>(cfg, links, aux_links, lr, shift);
        }
        [lr1, lr2, lt, aux_lt, measurement] => {
            need(lr1, cfg.chain_len(), "lr1")?;
            need(lr2, cfg.chain_len(), "lr2")?;
            need(lt, owned * G::WORDS, "lt")?;
            if cfg.local.halo {
                need(aux_lt, cfg.aux_len(), "aux_lt")?;
            }
            need(measurement, measurement_len, "measurement")?;
            wilson::accumulate::<G>(cfg, lr1, lr2, lt, aux_lt, measurement);
        }
        _ => return Err(fail(format!("unsupported argument count {nargs}"))),
    }
    Ok(())
}
