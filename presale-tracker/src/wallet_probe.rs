// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wallet detection
//!
//! The host environment (a browser shell, a mobile webview, a test) is
//! queried through [`EnvironmentProbe`]; [`detect_wallets`] turns what it
//! reports into the list of wallets a user can pick from.

use crate::contribution::SourceChain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Injected provider families a host can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// EIP-1193 provider
    Ethereum,
    Solana,
    /// Dedicated Coinbase Wallet extension object
    CoinbaseExtension,
}

/// Flags an injected provider advertises about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    #[serde(default)]
    pub is_metamask: bool,
    #[serde(default)]
    pub is_coinbase_wallet: bool,
    #[serde(default)]
    pub is_phantom: bool,
    #[serde(default)]
    pub is_brave_wallet: bool,
    /// Providers sharing the injection point
    #[serde(default)]
    pub provider_count: usize,
}

pub trait EnvironmentProbe: Send + Sync {
    /// Capabilities of the provider of this kind, if one is injected
    fn has_provider(&self, kind: ProviderKind) -> Option<ProviderCapabilities>;

    fn is_mobile(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletKind {
    MetaMask,
    WalletConnect,
    Phantom,
    CoinbaseWallet,
}

impl WalletKind {
    pub fn label(&self) -> &'static str {
        match self {
            WalletKind::MetaMask => "MetaMask",
            WalletKind::WalletConnect => "WalletConnect",
            WalletKind::Phantom => "Phantom",
            WalletKind::CoinbaseWallet => "Coinbase Wallet",
        }
    }

    /// Chains this wallet can pay from
    pub fn payment_chains(&self) -> &'static [SourceChain] {
        match self {
            WalletKind::Phantom => &[SourceChain::Solana],
            WalletKind::MetaMask | WalletKind::WalletConnect | WalletKind::CoinbaseWallet => {
                &[SourceChain::Ethereum, SourceChain::Bsc]
            }
        }
    }

    /// Whether vested tokens can be claimed with this wallet on XDC
    pub fn can_claim_on_xdc(&self) -> bool {
        !matches!(self, WalletKind::Phantom)
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMethod {
    /// Talk to the injected provider
    Injected,
    /// Open the wallet app through its deep link
    DeepLink,
    QrCode,
    /// Not present; offer the install page
    InstallPrompt,
}

/// One entry in the wallet picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedWallet {
    pub kind: WalletKind,
    pub method: ConnectionMethod,
    pub installed: bool,
}

impl DetectedWallet {
    fn new(kind: WalletKind, method: ConnectionMethod) -> Self {
        Self {
            kind,
            method,
            installed: matches!(method, ConnectionMethod::Injected),
        }
    }
}

/// Detected wallets in display order: MetaMask, Coinbase Wallet, Phantom,
/// then WalletConnect when a project id is configured.
pub fn detect_wallets(
    probe: &dyn EnvironmentProbe,
    walletconnect_project_id: Option<&str>,
) -> Vec<DetectedWallet> {
    let mobile = probe.is_mobile();
    let not_installed = if mobile {
        ConnectionMethod::DeepLink
    } else {
        ConnectionMethod::InstallPrompt
    };

    let ethereum = probe.has_provider(ProviderKind::Ethereum);
    let coinbase_extension = probe.has_provider(ProviderKind::CoinbaseExtension).is_some();
    // Coinbase Wallet also sets isMetaMask on the shared provider
    let ethereum_is_coinbase = ethereum.as_ref().is_some_and(|caps| caps.is_coinbase_wallet);
    let ethereum_is_metamask = ethereum
        .as_ref()
        .is_some_and(|caps| caps.is_metamask && !caps.is_coinbase_wallet && !caps.is_brave_wallet);
    // Several injected wallets behind one proxy: MetaMask is usually among them
    let multi_injected = ethereum
        .as_ref()
        .is_some_and(|caps| caps.provider_count > 1 && caps.is_metamask);

    let mut wallets = Vec::with_capacity(4);

    wallets.push(if ethereum_is_metamask || multi_injected {
        DetectedWallet::new(WalletKind::MetaMask, ConnectionMethod::Injected)
    } else {
        DetectedWallet::new(WalletKind::MetaMask, not_installed)
    });

    wallets.push(if coinbase_extension || ethereum_is_coinbase {
        DetectedWallet::new(WalletKind::CoinbaseWallet, ConnectionMethod::Injected)
    } else {
        DetectedWallet::new(WalletKind::CoinbaseWallet, not_installed)
    });

    let phantom = probe
        .has_provider(ProviderKind::Solana)
        .is_some_and(|caps| caps.is_phantom);
    wallets.push(if phantom {
        DetectedWallet::new(WalletKind::Phantom, ConnectionMethod::Injected)
    } else {
        DetectedWallet::new(WalletKind::Phantom, not_installed)
    });

    if walletconnect_project_id.is_some_and(|id| !id.trim().is_empty()) {
        wallets.push(DetectedWallet::new(
            WalletKind::WalletConnect,
            ConnectionMethod::QrCode,
        ));
    }

    wallets
}

/// Fixed environment, for hosts that report once and for tests
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    providers: HashMap<ProviderKind, ProviderCapabilities>,
    mobile: bool,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, kind: ProviderKind, caps: ProviderCapabilities) -> Self {
        self.providers.insert(kind, caps);
        self
    }

    pub fn mobile(mut self, mobile: bool) -> Self {
        self.mobile = mobile;
        self
    }
}

impl EnvironmentProbe for StaticProbe {
    fn has_provider(&self, kind: ProviderKind) -> Option<ProviderCapabilities> {
        self.providers.get(&kind).cloned()
    }

    fn is_mobile(&self) -> bool {
        self.mobile
    }
}
