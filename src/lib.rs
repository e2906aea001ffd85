// SPDX-License-Identifier: MIT

pub mod flow;
